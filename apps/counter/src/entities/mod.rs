pub mod counter_rows;

pub use counter_rows::Entity as CounterRows;
pub use counter_rows::Model as CounterRowModel;
