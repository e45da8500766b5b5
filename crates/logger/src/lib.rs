mod subscriber;

pub use subscriber::{init, init_with_level};
