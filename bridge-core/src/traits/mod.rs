pub use client::*;
pub use codec::*;
pub use signer::*;
pub use store::*;

mod client;
mod codec;
mod signer;
mod store;
