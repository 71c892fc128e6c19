pub mod proposal;
pub mod view;
