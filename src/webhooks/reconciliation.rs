use crate::entities::{order, payment, OrderStatus, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::cart::consume_active_entries;
use crate::services::orders::find_by_provider_order_id;
use crate::services::pricing::{from_minor_units, to_minor_units};
use crate::webhooks::event::{PaymentEntity, ProviderEvent};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// What a delivery did to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Captured {
        order_id: Uuid,
        cart_entries_removed: u64,
    },
    Failed {
        order_id: Uuid,
    },
    /// Payment was already terminal, or a concurrent delivery won the race.
    AlreadySettled {
        order_id: Uuid,
        status: PaymentStatus,
    },
    OrderNotFound {
        provider_order_id: String,
    },
    Ignored {
        event: String,
    },
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Captured { .. } => "captured",
            ReconcileOutcome::Failed { .. } => "failed",
            ReconcileOutcome::AlreadySettled { .. } => "already_settled",
            ReconcileOutcome::OrderNotFound { .. } => "order_not_found",
            ReconcileOutcome::Ignored { .. } => "ignored",
        }
    }
}

/// The only writer of PAID / FAILED. Each transition runs in one transaction
/// guarded by `UPDATE .. WHERE status = 'PENDING'`.
pub struct PaymentReconciler {
    db: Arc<DatabaseConnection>,
    events: Arc<EventSender>,
}

enum Lookup {
    Pending(order::Model, payment::Model),
    Settled(ReconcileOutcome),
}

impl PaymentReconciler {
    pub fn new(db: Arc<DatabaseConnection>, events: Arc<EventSender>) -> Self {
        Self { db, events }
    }

    /// Applies an authenticated event. `raw_payload` is stored for audit.
    #[instrument(skip(self, event, raw_payload), fields(event = %event.name()))]
    pub async fn apply(
        &self,
        event: &ProviderEvent,
        raw_payload: &str,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let outcome = match event {
            ProviderEvent::PaymentCaptured(entity) => self.capture(entity, raw_payload).await?,
            ProviderEvent::PaymentFailed(entity) => self.fail(entity, raw_payload).await?,
            ProviderEvent::Unknown { event } => {
                info!(event = %event, "Ignoring unhandled webhook event");
                ReconcileOutcome::Ignored {
                    event: event.clone(),
                }
            }
        };

        counter!("payments.webhook.outcome", 1, "outcome" => outcome.label());
        Ok(outcome)
    }

    async fn lookup(
        &self,
        txn: &DatabaseTransaction,
        entity: &PaymentEntity,
        incoming: PaymentStatus,
    ) -> Result<Lookup, ServiceError> {
        let Some((order, payment)) = find_by_provider_order_id(txn, &entity.order_id).await?
        else {
            warn!(
                provider_order_id = %entity.order_id,
                provider_payment_id = %entity.id,
                "Webhook references an unknown order; needs manual investigation"
            );
            return Ok(Lookup::Settled(ReconcileOutcome::OrderNotFound {
                provider_order_id: entity.order_id.clone(),
            }));
        };

        let payment = payment.ok_or_else(|| {
            ServiceError::InternalError(format!("order {} has no payment row", order.id))
        })?;

        if payment.status.is_terminal() {
            if payment.status != incoming {
                // Terminal states never move; surface the conflict to operators.
                error!(
                    order_id = %order.id,
                    provider_order_id = %order.provider_order_id,
                    current = ?payment.status,
                    incoming = ?incoming,
                    "Conflicting webhook for settled payment ignored"
                );
            } else {
                info!(
                    order_id = %order.id,
                    status = ?payment.status,
                    "Duplicate webhook delivery; nothing to do"
                );
            }
            return Ok(Lookup::Settled(ReconcileOutcome::AlreadySettled {
                order_id: order.id,
                status: payment.status,
            }));
        }

        Ok(Lookup::Pending(order, payment))
    }

    /// Compare-and-set on the payment row. False means another delivery won.
    async fn transition_payment(
        txn: &DatabaseTransaction,
        payment_id: Uuid,
        changes: payment::ActiveModel,
    ) -> Result<bool, ServiceError> {
        let result = payment::Entity::update_many()
            .set(changes)
            .filter(payment::Column::Id.eq(payment_id))
            .filter(payment::Column::Status.eq(PaymentStatus::Pending))
            .exec(txn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn transition_order(
        txn: &DatabaseTransaction,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<(), ServiceError> {
        let result = order::Entity::update_many()
            .set(order::ActiveModel {
                status: Set(status),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(txn)
            .await?;

        if result.rows_affected != 1 {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} was not pending while its payment was",
                order_id
            )));
        }
        Ok(())
    }

    async fn capture(
        &self,
        entity: &PaymentEntity,
        raw_payload: &str,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        let (order, payment) = match self.lookup(&txn, entity, PaymentStatus::Captured).await? {
            Lookup::Pending(order, payment) => (order, payment),
            Lookup::Settled(outcome) => {
                txn.rollback().await?;
                return Ok(outcome);
            }
        };

        let amount = from_minor_units(entity.amount);
        if !captured_matches_total(order.total, entity.amount) {
            warn!(
                order_id = %order.id,
                expected = %order.total,
                captured = %amount,
                "Captured amount differs from order total"
            );
        }

        let now = Utc::now();
        let won = Self::transition_payment(
            &txn,
            payment.id,
            payment::ActiveModel {
                status: Set(PaymentStatus::Captured),
                provider_payment_id: Set(Some(entity.id.clone())),
                amount: Set(amount),
                currency: Set(entity.currency.to_ascii_uppercase()),
                event_payload: Set(Some(raw_payload.to_string())),
                updated_at: Set(now),
                ..Default::default()
            },
        )
        .await?;

        if !won {
            txn.rollback().await?;
            info!(order_id = %order.id, "Concurrent delivery already settled this payment");
            return Ok(ReconcileOutcome::AlreadySettled {
                order_id: order.id,
                status: PaymentStatus::Captured,
            });
        }

        Self::transition_order(&txn, order.id, OrderStatus::Paid).await?;
        let removed = consume_active_entries(&txn, order.user_id, now).await?;
        txn.commit().await?;

        info!(
            order_id = %order.id,
            provider_order_id = %order.provider_order_id,
            provider_payment_id = %entity.id,
            cart_entries_removed = removed,
            "Payment captured; order paid"
        );
        self.events
            .send_or_log(Event::PaymentCaptured {
                order_id: order.id,
                user_id: order.user_id,
                provider_order_id: order.provider_order_id,
                provider_payment_id: entity.id.clone(),
                amount,
                cart_entries_removed: removed,
            })
            .await;

        Ok(ReconcileOutcome::Captured {
            order_id: order.id,
            cart_entries_removed: removed,
        })
    }

    async fn fail(
        &self,
        entity: &PaymentEntity,
        raw_payload: &str,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        let (order, payment) = match self.lookup(&txn, entity, PaymentStatus::Failed).await? {
            Lookup::Pending(order, payment) => (order, payment),
            Lookup::Settled(outcome) => {
                txn.rollback().await?;
                return Ok(outcome);
            }
        };

        let reason = entity.failure_reason();
        let won = Self::transition_payment(
            &txn,
            payment.id,
            payment::ActiveModel {
                status: Set(PaymentStatus::Failed),
                provider_payment_id: Set(Some(entity.id.clone())),
                failure_reason: Set(reason.clone()),
                event_payload: Set(Some(raw_payload.to_string())),
                updated_at: Set(Utc::now()),
                ..Default::default()
            },
        )
        .await?;

        if !won {
            txn.rollback().await?;
            info!(order_id = %order.id, "Concurrent delivery already settled this payment");
            return Ok(ReconcileOutcome::AlreadySettled {
                order_id: order.id,
                status: PaymentStatus::Failed,
            });
        }

        Self::transition_order(&txn, order.id, OrderStatus::Failed).await?;
        txn.commit().await?;

        info!(
            order_id = %order.id,
            provider_order_id = %order.provider_order_id,
            reason = ?reason,
            "Payment failed; order closed, cart kept"
        );
        self.events
            .send_or_log(Event::PaymentFailed {
                order_id: order.id,
                provider_order_id: order.provider_order_id,
                reason,
            })
            .await;

        Ok(ReconcileOutcome::Failed { order_id: order.id })
    }
}

/// Compares in paise. Stored totals can come back with float noise on SQLite.
fn captured_matches_total(total: Decimal, captured_minor: i64) -> bool {
    to_minor_units(total.round_dp(2)).map_or(false, |expected| expected == captured_minor)
}
