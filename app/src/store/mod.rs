pub mod container;
pub mod keyed;

pub use container::{Listener, StateContainer, SubscriptionId};
pub use keyed::KeyedStore;
