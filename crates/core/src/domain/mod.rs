pub mod flow;
pub mod tenant;
