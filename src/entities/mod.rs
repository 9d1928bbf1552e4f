pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod product;
pub mod user;

pub use order::{OrderStatus, PaymentMethod, PaymentStatus};
pub use user::Rank;
