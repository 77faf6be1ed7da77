pub mod auth;
pub mod carts;
pub mod categories;
pub mod common;
pub mod orders;
pub mod payment_webhooks;
pub mod products;

use crate::{
    auth::AuthService,
    events::EventSender,
    services::{
        CartService, CategoryService, OrderService, PaymentProvider, ProductService, UserService,
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Aggregated application services consumed by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub users: Arc<UserService>,
    pub categories: Arc<CategoryService>,
    pub products: Arc<ProductService>,
    pub carts: Arc<CartService>,
    pub orders: Arc<OrderService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        auth: Arc<AuthService>,
        payment_provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            users: Arc::new(UserService::new(
                db.clone(),
                auth,
                event_sender.clone(),
            )),
            categories: Arc::new(CategoryService::new(db.clone())),
            products: Arc::new(ProductService::new(db.clone())),
            carts: Arc::new(CartService::new(db.clone(), event_sender.clone())),
            orders: Arc::new(OrderService::new(db, event_sender, payment_provider)),
        }
    }
}
