pub mod entity;
pub mod observation;
pub mod recommendation;
pub mod request;
