pub mod product;
pub mod query;

pub use product::{NewProduct, Product, ProductPatch};
pub use query::{Page, ProductQuery, SortField, SortOrder};
