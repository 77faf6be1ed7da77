use crate::{
    entities::{cart, cart_item, product, Cart, CartItem, Product},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Shopping cart service.
///
/// Carts are keyed by user: each user has at most one cart, created lazily on
/// first access. Line items store only a product reference and a quantity;
/// titles and prices are resolved against the live catalog whenever a view is
/// built, so the cart always shows current pricing.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Returns the user's cart, creating an empty one if none exists yet.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(&*self.db, user_id).await?;
        build_cart_view(&*self.db, &cart).await
    }

    /// Adds a product to the cart, incrementing the quantity if a line for
    /// the product already exists.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddItemInput,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let product = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product".to_string()))?;

        let cart = self.get_or_create_cart(&txn, user_id).await?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product.id))
            .one(&txn)
            .await?;

        match existing {
            Some(item) => {
                let quantity = item.quantity + input.quantity;
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(quantity);
                item.updated_at = Set(Utc::now());
                item.update(&txn).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product.id),
                    quantity: Set(input.quantity),
                    image_url: Set(product.image.clone()),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                }
                .insert(&txn)
                .await?;
            }
        }

        touch_cart(&txn, &cart).await?;
        let view = build_cart_view(&txn, &cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id: product.id,
            })
            .await;

        info!(
            cart_id = %cart.id,
            product_id = %product.id,
            quantity = input.quantity,
            "added item to cart"
        );
        Ok(view)
    }

    /// Sets the quantity of an existing cart line. Quantity must already be
    /// validated as positive at the boundary.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = self.require_cart(&txn, user_id).await?;
        let item = self.require_item(&txn, &cart, item_id).await?;

        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(quantity);
        item.updated_at = Set(Utc::now());
        item.update(&txn).await?;

        touch_cart(&txn, &cart).await?;
        let view = build_cart_view(&txn, &cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                cart_id: cart.id,
                item_id,
            })
            .await;

        Ok(view)
    }

    /// Removes a line from the cart.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = self.require_cart(&txn, user_id).await?;
        let item = self.require_item(&txn, &cart, item_id).await?;

        CartItem::delete_by_id(item.id).exec(&txn).await?;

        touch_cart(&txn, &cart).await?;
        let view = build_cart_view(&txn, &cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: cart.id,
                item_id,
            })
            .await;

        Ok(view)
    }

    /// Deletes every line from the user's cart. Clearing an already-empty
    /// cart succeeds as a no-op.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = self.require_cart(&txn, user_id).await?;

        let deleted = CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        touch_cart(&txn, &cart).await?;
        let view = build_cart_view(&txn, &cart).await?;
        txn.commit().await?;

        if deleted.rows_affected > 0 {
            self.event_sender.send_or_log(Event::CartCleared(cart.id)).await;
        }

        info!(cart_id = %cart.id, removed = deleted.rows_affected, "cleared cart");
        Ok(view)
    }

    async fn get_or_create_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
    ) -> Result<cart::Model, ServiceError> {
        if let Some(cart) = find_cart(conn, user_id).await? {
            return Ok(cart);
        }

        let insert = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(conn)
        .await;

        match insert {
            Ok(cart) => {
                self.event_sender.send_or_log(Event::CartCreated(cart.id)).await;
                info!(cart_id = %cart.id, %user_id, "created cart");
                Ok(cart)
            }
            // a concurrent request may have created the cart first; the
            // unique user_id constraint makes the loser re-read
            Err(err) => find_cart(conn, user_id).await?.ok_or_else(|| err.into()),
        }
    }

    async fn require_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
    ) -> Result<cart::Model, ServiceError> {
        find_cart(conn, user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart".to_string()))
    }

    async fn require_item<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart: &cart::Model,
        item_id: Uuid,
    ) -> Result<cart_item::Model, ServiceError> {
        CartItem::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Item".to_string()))
    }
}

async fn find_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<Option<cart::Model>, ServiceError> {
    Ok(Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?)
}

async fn touch_cart<C: ConnectionTrait>(
    conn: &C,
    cart: &cart::Model,
) -> Result<(), ServiceError> {
    let mut update: cart::ActiveModel = cart.clone().into();
    update.updated_at = Set(Utc::now());
    update.update(conn).await?;
    Ok(())
}

/// Builds the response view for a cart: every line is joined against the
/// live product. A deleted product does not drop the line; its title shows
/// empty and its price zero.
pub(crate) async fn build_cart_view<C: ConnectionTrait>(
    conn: &C,
    cart: &cart::Model,
) -> Result<CartView, ServiceError> {
    let lines = CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .order_by_asc(cart_item::Column::CreatedAt)
        .find_also_related(Product)
        .all(conn)
        .await?;

    let items: Vec<CartItemView> = lines
        .into_iter()
        .map(|(line, product)| CartItemView::from_line(&line, product.as_ref()))
        .collect();

    let total_quantity: i32 = items.iter().map(|i| i.quantity).sum();
    let total_price: Decimal = items.iter().map(|i| i.total_price).sum();

    Ok(CartView {
        id: cart.id,
        user_id: cart.user_id,
        items,
        total_quantity,
        total_price,
    })
}

/// Input for adding a product to the cart
#[derive(Debug, Deserialize)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// One cart line as shown to the client, with derived pricing
#[derive(Debug, Clone, Serialize)]
pub struct CartItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_title: String,
    pub price: Decimal,
    pub quantity: i32,
    pub total_price: Decimal,
    pub image_url: Option<String>,
}

impl CartItemView {
    fn from_line(line: &cart_item::Model, product: Option<&product::Model>) -> Self {
        let product_title = product.map(|p| p.title.clone()).unwrap_or_default();
        let price = product.map(|p| p.price).unwrap_or(Decimal::ZERO);

        Self {
            id: line.id,
            product_id: line.product_id,
            product_title,
            price,
            quantity: line.quantity,
            total_price: price * Decimal::from(line.quantity),
            image_url: line.image_url.clone(),
        }
    }
}

/// Cart response shape
#[derive(Debug, Serialize)]
pub struct CartView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartItemView>,
    pub total_quantity: i32,
    pub total_price: Decimal,
}
