pub mod carts;
pub mod charges;
pub mod checkout;
pub mod email;
pub mod orders;
pub mod products;
