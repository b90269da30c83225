use crate::entities::{order, order_line_item, payment, OrderStatus, PaymentStatus};
use crate::errors::ServiceError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineItemView {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Unit price frozen at order creation
    #[schema(value_type = String, example = "599.99")]
    pub price: Decimal,
}

impl From<order_line_item::Model> for LineItemView {
    fn from(item: order_line_item::Model) -> Self {
        Self {
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
        }
    }
}

/// Read-only view of an order and its payment, as the ledger records it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: Uuid,
    /// Provider order id
    #[schema(example = "order_NmH2oXh3zv1a9K")]
    pub order_id: String,
    pub status: OrderStatus,
    pub payment_status: Option<PaymentStatus>,
    #[schema(value_type = String, example = "662.48")]
    pub total: Decimal,
    pub currency: Option<String>,
    pub provider_payment_id: Option<String>,
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub line_items: Vec<LineItemView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderView {
    fn build(
        order: order::Model,
        payment: Option<payment::Model>,
        line_items: Vec<order_line_item::Model>,
    ) -> Self {
        Self {
            id: order.id,
            order_id: order.provider_order_id,
            status: order.status,
            payment_status: payment.as_ref().map(|p| p.status),
            total: order.total,
            currency: payment.as_ref().map(|p| p.currency.clone()),
            provider_payment_id: payment.as_ref().and_then(|p| p.provider_payment_id.clone()),
            failure_reason: payment.and_then(|p| p.failure_reason),
            line_items: line_items.into_iter().map(LineItemView::from).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// Looks up an order and its payment by the provider's order id.
pub async fn find_by_provider_order_id<C>(
    conn: &C,
    provider_order_id: &str,
) -> Result<Option<(order::Model, Option<payment::Model>)>, sea_orm::DbErr>
where
    C: ConnectionTrait,
{
    order::Entity::find()
        .filter(order::Column::ProviderOrderId.eq(provider_order_id))
        .find_also_related(payment::Entity)
        .one(conn)
        .await
}

/// Read path for order status polling and the "Your Orders" view.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The caller's orders, newest first.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrderView>, ServiceError> {
        let rows = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .find_also_related(payment::Entity)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(order, payment)| OrderView::build(order, payment, Vec::new()))
            .collect())
    }

    /// One order owned by `user_id`, with its frozen line items.
    /// Orders belonging to someone else read as not found.
    pub async fn status_for_user(
        &self,
        user_id: Uuid,
        provider_order_id: &str,
    ) -> Result<OrderView, ServiceError> {
        let db = &*self.db;
        let (order, payment) = find_by_provider_order_id(db, provider_order_id)
            .await?
            .filter(|(order, _)| order.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("order {}", provider_order_id)))?;

        let line_items = order
            .find_related(order_line_item::Entity)
            .order_by_asc(order_line_item::Column::CreatedAt)
            .all(db)
            .await?;

        Ok(OrderView::build(order, payment, line_items))
    }

    /// Ownership check used by the checkout verification helper.
    pub async fn owned_by(
        &self,
        user_id: Uuid,
        provider_order_id: &str,
    ) -> Result<bool, ServiceError> {
        Ok(find_by_provider_order_id(&*self.db, provider_order_id)
            .await?
            .map(|(order, _)| order.user_id == user_id)
            .unwrap_or(false))
    }
}
