pub mod customer;
pub mod product;
pub mod recommendation;
pub mod transaction;
