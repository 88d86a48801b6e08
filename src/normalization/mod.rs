pub mod category;
pub mod price;
pub mod text;
