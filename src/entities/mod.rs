pub mod cart_entry;
pub mod order;
pub mod order_line_item;
pub mod payment;
pub mod product;
pub mod user;

pub use order::OrderStatus;
pub use payment::PaymentStatus;
