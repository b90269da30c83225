use crate::entities::{cart_entry, product};
use crate::errors::ServiceError;
use crate::services::pricing::PriceLine;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// An active cart entry joined with the product's current catalog row.
#[derive(Debug, Clone)]
pub struct CartLine {
    pub entry: cart_entry::Model,
    pub product: product::Model,
}

impl CartLine {
    pub fn price_line(&self) -> PriceLine {
        PriceLine {
            product_id: self.product.id,
            unit_price: self.product.price,
            quantity: self.entry.quantity,
        }
    }
}

/// Reads active cart lines through any connection, including an open transaction.
pub async fn load_active_lines<C>(conn: &C, user_id: Uuid) -> Result<Vec<CartLine>, DbErr>
where
    C: ConnectionTrait,
{
    let rows = cart_entry::Entity::find()
        .filter(cart_entry::Column::UserId.eq(user_id))
        .filter(cart_entry::Column::RemovedAt.is_null())
        .order_by_asc(cart_entry::Column::AddedAt)
        .find_also_related(product::Entity)
        .all(conn)
        .await?;

    rows.into_iter()
        .map(|(entry, product)| {
            product
                .map(|product| CartLine {
                    entry: entry.clone(),
                    product,
                })
                .ok_or_else(|| {
                    DbErr::RecordNotFound(format!(
                        "product {} referenced by cart entry {}",
                        entry.product_id, entry.id
                    ))
                })
        })
        .collect()
}

/// Soft-deletes every active entry of `user_id`. Returns the number of rows touched.
pub async fn consume_active_entries<C>(
    conn: &C,
    user_id: Uuid,
    at: DateTime<Utc>,
) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
{
    let result = cart_entry::Entity::update_many()
        .set(cart_entry::ActiveModel {
            removed_at: Set(Some(at)),
            ..Default::default()
        })
        .filter(cart_entry::Column::UserId.eq(user_id))
        .filter(cart_entry::Column::RemovedAt.is_null())
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Adds `quantity` of a product, merging into an existing active entry.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<cart_entry::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be greater than zero".into(),
            ));
        }

        let db = &*self.db;
        product::Entity::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {}", product_id)))?;

        let existing = cart_entry::Entity::find()
            .filter(cart_entry::Column::UserId.eq(user_id))
            .filter(cart_entry::Column::ProductId.eq(product_id))
            .filter(cart_entry::Column::RemovedAt.is_null())
            .one(db)
            .await?;

        let entry = match existing {
            Some(entry) => {
                let new_quantity = entry.quantity.checked_add(quantity).ok_or_else(|| {
                    ServiceError::ValidationError("quantity is too large".into())
                })?;
                let mut active: cart_entry::ActiveModel = entry.into();
                active.quantity = Set(new_quantity);
                active.update(db).await?
            }
            None => {
                cart_entry::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    added_at: Set(Utc::now()),
                    removed_at: Set(None),
                }
                .insert(db)
                .await?
            }
        };

        info!(%user_id, %product_id, quantity = entry.quantity, "Cart entry saved");
        Ok(entry)
    }

    pub async fn active_lines(&self, user_id: Uuid) -> Result<Vec<CartLine>, ServiceError> {
        Ok(load_active_lines(&*self.db, user_id).await?)
    }

    pub async fn active_count(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        Ok(cart_entry::Entity::find()
            .filter(cart_entry::Column::UserId.eq(user_id))
            .filter(cart_entry::Column::RemovedAt.is_null())
            .count(&*self.db)
            .await?)
    }
}
