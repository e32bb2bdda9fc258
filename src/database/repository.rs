use std::marker::PhantomData;

use async_trait::async_trait;

use crate::database::context::{DataContext, DbContext};
use crate::database::entity::{Entity, Value};
use crate::database::error::DatabaseError;
use crate::database::filter::Filter;
use crate::database::transaction::{DbTransaction, IsolationLevel};

/// Base repository trait defining common database operations
/// All typed repositories implement this trait
#[async_trait]
pub trait Repository: Send + Sync {
    /// Associated type for the entity this repository manages
    type Entity: Send + Sync;

    /// Find an entity by its key
    async fn find_by_id(&self, id: Value) -> Result<Option<Self::Entity>, DatabaseError>;

    /// Find all entities, ordered by key
    async fn find_all(&self) -> Result<Vec<Self::Entity>, DatabaseError>;

    /// Find entities matching a filter, ordered by key
    async fn find_where(&self, filter: &Filter) -> Result<Vec<Self::Entity>, DatabaseError>;

    /// Insert a new entity
    async fn insert(&self, entity: &Self::Entity) -> Result<bool, DatabaseError>;

    /// Update an existing entity
    async fn update(&self, entity: &Self::Entity) -> Result<bool, DatabaseError>;

    /// Delete an entity
    async fn delete(&self, entity: &Self::Entity) -> Result<bool, DatabaseError>;

    /// Check if an entity exists by key
    async fn exists(&self, id: Value) -> Result<bool, DatabaseError> {
        match self.find_by_id(id).await {
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Trait for repositories that support transactions
#[async_trait]
pub trait TransactionalRepository: Repository {
    /// Get a reference to the underlying context
    fn context(&self) -> &DbContext;

    /// Open a transaction on the repository's context
    async fn begin(&self, isolation: Option<IsolationLevel>) -> Result<DbTransaction, DatabaseError> {
        self.context().begin_transaction(isolation).await
    }
}

/// Repository over any [`Entity`], delegating to a [`DbContext`]
#[derive(Debug)]
pub struct EntityRepository<T> {
    context: DbContext,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> EntityRepository<T> {
    pub fn new(context: DbContext) -> Self {
        Self {
            context,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for EntityRepository<T> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Entity> Repository for EntityRepository<T> {
    type Entity = T;

    async fn find_by_id(&self, id: Value) -> Result<Option<T>, DatabaseError> {
        self.context.clone().get_by_key_id::<T>(id).await
    }

    async fn find_all(&self) -> Result<Vec<T>, DatabaseError> {
        self.context.clone().get_list::<T>(None).await
    }

    async fn find_where(&self, filter: &Filter) -> Result<Vec<T>, DatabaseError> {
        self.context.clone().get_list::<T>(Some(filter)).await
    }

    async fn insert(&self, entity: &T) -> Result<bool, DatabaseError> {
        self.context.clone().create(entity).await
    }

    async fn update(&self, entity: &T) -> Result<bool, DatabaseError> {
        self.context.clone().update(entity).await
    }

    async fn delete(&self, entity: &T) -> Result<bool, DatabaseError> {
        self.context.clone().delete(entity).await
    }

    // Cheaper than the default: scalar probe instead of loading the row
    async fn exists(&self, id: Value) -> Result<bool, DatabaseError> {
        if id.is_null() {
            return Err(DatabaseError::validation("id", "key must not be null"));
        }
        let filter = Filter::eq(T::KEY, id);
        self.context.clone().exist::<T>(Some(&filter)).await
    }
}

#[async_trait]
impl<T: Entity> TransactionalRepository for EntityRepository<T> {
    fn context(&self) -> &DbContext {
        &self.context
    }
}
