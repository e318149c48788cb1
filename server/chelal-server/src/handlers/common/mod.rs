pub mod crud;

pub use crud::{delete_one, delete_row, fetch_one, fetch_page, get_one, Resource};
