pub use chain::*;
pub use cursor::*;
pub use event::*;
pub use price::*;
pub use tx::*;

mod chain;
mod cursor;
mod event;
mod price;
mod tx;
