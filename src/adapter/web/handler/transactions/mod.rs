pub mod post;
pub mod recover;
