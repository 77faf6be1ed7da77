pub mod carts;
pub mod categories;
pub mod orders;
pub mod payments;
pub mod products;
pub mod users;

pub use carts::CartService;
pub use categories::CategoryService;
pub use orders::OrderService;
pub use payments::{PaymentLink, PaymentProvider, YookassaProvider};
pub use products::ProductService;
pub use users::UserService;
