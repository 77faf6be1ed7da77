use crate::{
    entities::{
        cart, cart_item,
        order::{self, OrderStatus},
        order_item, product, Cart, CartItem, Order, OrderItem, Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::payments::PaymentProvider,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Order service: owns the order ledger and drives the cart-to-order
/// transition.
///
/// Checkout converts the user's mutable cart into an immutable priced
/// snapshot. The cart read, the snapshot, the order insert, and the cart
/// clear all happen in a single transaction, so a second concurrent checkout
/// for the same user either serializes behind the first or finds an empty
/// cart. The external payment call is made only after that transaction has
/// committed; no database lock is ever held across the provider round-trip.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    payment_provider: Arc<dyn PaymentProvider>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        payment_provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            db,
            event_sender,
            payment_provider,
        }
    }

    /// Performs checkout for the user's cart.
    ///
    /// If the payment session cannot be created, the already-committed order
    /// stays in `created` with no external id; it is visible to operator
    /// tooling for manual reconciliation and is not retried here.
    #[instrument(skip(self))]
    pub async fn create_order(&self, user_id: Uuid) -> Result<CheckoutResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart".to_string()))?;

        let lines = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(Product)
            .all(&txn)
            .await?;

        if lines.is_empty() {
            return Err(ServiceError::NotFound("Items".to_string()));
        }

        let (snapshots, total_quantity, total_price) = snapshot_lines(&lines);

        if total_quantity <= 0 {
            return Err(ServiceError::InvariantViolation(
                "order total_quantity must be positive".to_string(),
            ));
        }
        if total_price < Decimal::ZERO {
            return Err(ServiceError::InvariantViolation(
                "order total_price must be non-negative".to_string(),
            ));
        }

        let order_id = Uuid::new_v4();
        let order_model = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(Some(user_id)),
            status: Set(OrderStatus::Created),
            total_quantity: Set(total_quantity),
            total_price: Set(total_price),
            created_at: Set(Utc::now()),
            external_id: Set(None),
            payment_details: Set(None),
            paid_at: Set(None),
        }
        .insert(&txn)
        .await?;

        for snapshot in snapshots {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(snapshot.product_id),
                product_name: Set(snapshot.product_name),
                price: Set(snapshot.price),
                quantity: Set(snapshot.quantity),
                result_price: Set(snapshot.result_price),
            }
            .insert(&txn)
            .await?;
        }

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        self.event_sender.send_or_log(Event::OrderCreated(order_id)).await;
        self.event_sender.send_or_log(Event::CartCleared(cart.id)).await;
        info!(%order_id, %user_id, total_quantity, %total_price, "order created");

        // provider call strictly after commit; the order is already durable
        let link = self.payment_provider.create_payment_link(&order_model).await?;

        let order_model = self
            .update_order(
                order_id,
                OrderChanges {
                    external_id: Some(link.payment_id.clone()),
                    ..OrderChanges::default()
                },
            )
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order".to_string()))?;

        self.event_sender
            .send_or_log(Event::PaymentLinkCreated {
                order_id,
                payment_id: link.payment_id,
            })
            .await;

        Ok(CheckoutResponse {
            order: self.build_order_view(order_model).await?,
            payment_url: link.confirmation_url,
        })
    }

    /// Full order view with items.
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order".to_string()))?;

        self.build_order_view(order).await
    }

    /// All orders of a user, newest first, items omitted. An empty history
    /// is reported as `NotFound("Orders")`.
    pub async fn list_orders(&self, user_id: Uuid) -> Result<Vec<OrderView>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        if orders.is_empty() {
            return Err(ServiceError::NotFound("Orders".to_string()));
        }

        Ok(orders.into_iter().map(|o| OrderView::new(o, vec![])).collect())
    }

    /// Applies a payment-succeeded notification to the order.
    ///
    /// Webhook delivery is at-least-once: a replay for an already-paid order
    /// with the same external id is a no-op success. A notification for a
    /// failed or cancelled order is rejected; terminal states never flip.
    #[instrument(skip(self, payment_details))]
    pub async fn apply_payment_update(
        &self,
        order_id: Uuid,
        external_id: String,
        payment_details: Value,
    ) -> Result<OrderView, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order".to_string()))?;

        if order.status == OrderStatus::Paid
            && order.external_id.as_deref() == Some(external_id.as_str())
        {
            info!(%order_id, %external_id, "duplicate payment notification ignored");
            return self.build_order_view(order).await;
        }

        if !order.status.can_transition_to(OrderStatus::Paid) {
            warn!(%order_id, status = ?order.status, "rejected paid transition");
            return Err(ServiceError::InvalidStatus(format!(
                "order {order_id} is {:?} and cannot be marked paid",
                order.status
            )));
        }

        let order = self
            .update_order(
                order_id,
                OrderChanges {
                    status: Some(OrderStatus::Paid),
                    external_id: Some(external_id),
                    payment_details: Some(payment_details),
                    paid_at: Some(Utc::now()),
                },
            )
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order".to_string()))?;

        self.event_sender.send_or_log(Event::OrderPaid(order_id)).await;
        info!(%order_id, "order marked as paid");

        self.build_order_view(order).await
    }

    /// Marks the order failed. Legal only from `created`.
    pub async fn mark_failed(&self, order_id: Uuid) -> Result<OrderView, ServiceError> {
        self.transition(order_id, OrderStatus::Failed).await
    }

    /// Marks the order cancelled. Legal only from `created`.
    pub async fn mark_cancelled(&self, order_id: Uuid) -> Result<OrderView, ServiceError> {
        self.transition(order_id, OrderStatus::Cancelled).await
    }

    async fn transition(
        &self,
        order_id: Uuid,
        next: OrderStatus,
    ) -> Result<OrderView, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order".to_string()))?;

        if !order.status.can_transition_to(next) {
            return Err(ServiceError::InvalidStatus(format!(
                "order {order_id} is {:?} and cannot become {next:?}",
                order.status
            )));
        }

        let order = self
            .update_order(
                order_id,
                OrderChanges {
                    status: Some(next),
                    ..OrderChanges::default()
                },
            )
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order".to_string()))?;

        let event = match next {
            OrderStatus::Failed => Event::OrderFailed(order_id),
            OrderStatus::Cancelled => Event::OrderCancelled(order_id),
            _ => Event::OrderCreated(order_id),
        };
        self.event_sender.send_or_log(event).await;

        self.build_order_view(order).await
    }

    /// Ledger-level partial update restricted to the payment fields and
    /// status. Returns `None` when the order does not exist; surfacing
    /// `NotFound` is the caller's concern.
    pub async fn update_order(
        &self,
        order_id: Uuid,
        changes: OrderChanges,
    ) -> Result<Option<order::Model>, ServiceError> {
        let Some(existing) = Order::find_by_id(order_id).one(&*self.db).await? else {
            return Ok(None);
        };

        let mut active: order::ActiveModel = existing.into();
        if let Some(status) = changes.status {
            active.status = Set(status);
        }
        if let Some(external_id) = changes.external_id {
            active.external_id = Set(Some(external_id));
        }
        if let Some(payment_details) = changes.payment_details {
            active.payment_details = Set(Some(payment_details));
        }
        if let Some(paid_at) = changes.paid_at {
            active.paid_at = Set(Some(paid_at));
        }

        Ok(Some(active.update(&*self.db).await?))
    }

    async fn build_order_view(&self, order: order::Model) -> Result<OrderView, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&*self.db)
            .await?;

        Ok(OrderView::new(order, items))
    }
}

struct ItemSnapshot {
    product_id: Uuid,
    product_name: String,
    price: Decimal,
    quantity: i32,
    result_price: Decimal,
}

/// Freezes cart lines into order-item drafts. Values are decoupled from any
/// later catalog change from this point on.
fn snapshot_lines(
    lines: &[(cart_item::Model, Option<product::Model>)],
) -> (Vec<ItemSnapshot>, i32, Decimal) {
    let mut snapshots = Vec::with_capacity(lines.len());
    let mut total_quantity = 0i32;
    let mut total_price = Decimal::ZERO;

    for (line, product) in lines {
        let product_name = product.as_ref().map(|p| p.title.clone()).unwrap_or_default();
        let price = product.as_ref().map(|p| p.price).unwrap_or(Decimal::ZERO);
        let result_price = price * Decimal::from(line.quantity);

        total_quantity += line.quantity;
        total_price += result_price;

        snapshots.push(ItemSnapshot {
            product_id: line.product_id,
            product_name,
            price,
            quantity: line.quantity,
            result_price,
        });
    }

    (snapshots, total_quantity, total_price)
}

/// Changes applicable to a persisted order
#[derive(Debug, Default)]
pub struct OrderChanges {
    pub status: Option<OrderStatus>,
    pub external_id: Option<String>,
    pub payment_details: Option<Value>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// One snapshotted order line as shown to the client
#[derive(Debug, Serialize)]
pub struct OrderItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub result_price: Decimal,
}

/// Order response shape
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub status: OrderStatus,
    pub total_quantity: i32,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub external_id: Option<String>,
    pub payment_details: Option<Value>,
    pub paid_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItemView>,
}

impl OrderView {
    fn new(order: order::Model, items: Vec<order_item::Model>) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            total_quantity: order.total_quantity,
            total_price: order.total_price,
            created_at: order.created_at,
            external_id: order.external_id,
            payment_details: order.payment_details,
            paid_at: order.paid_at,
            items: items
                .into_iter()
                .map(|item| OrderItemView {
                    id: item.id,
                    product_id: item.product_id,
                    product_name: item.product_name,
                    price: item.price,
                    quantity: item.quantity,
                    result_price: item.result_price,
                })
                .collect(),
        }
    }
}

/// Checkout result: the persisted order plus the provider redirect
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: OrderView,
    pub payment_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(quantity: i32, price: Option<Decimal>) -> (cart_item::Model, Option<product::Model>) {
        let product_id = Uuid::new_v4();
        let item = cart_item::Model {
            id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            product_id,
            quantity,
            image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let product = price.map(|price| product::Model {
            id: product_id,
            title: "Standing lamp".to_string(),
            description: None,
            price,
            category_id: Uuid::new_v4(),
            image: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        (item, product)
    }

    #[test]
    fn snapshot_totals_match_line_sums() {
        let lines = vec![line(2, Some(dec!(150.00))), line(1, Some(dec!(49.50)))];
        let (snapshots, total_quantity, total_price) = snapshot_lines(&lines);

        assert_eq!(snapshots.len(), 2);
        assert_eq!(total_quantity, 3);
        assert_eq!(total_price, dec!(349.50));
        assert_eq!(snapshots[0].result_price, dec!(300.00));
        assert_eq!(snapshots[1].result_price, dec!(49.50));
    }

    #[test]
    fn snapshot_of_missing_product_freezes_empty_name_and_zero_price() {
        let lines = vec![line(4, None)];
        let (snapshots, total_quantity, total_price) = snapshot_lines(&lines);

        assert_eq!(snapshots[0].product_name, "");
        assert_eq!(snapshots[0].price, Decimal::ZERO);
        assert_eq!(snapshots[0].result_price, Decimal::ZERO);
        assert_eq!(total_quantity, 4);
        assert_eq!(total_price, Decimal::ZERO);
    }
}
