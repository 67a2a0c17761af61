//! Cross-crate flows: the bridge service wired to a loopback node on a
//! shared in-memory bus, driven through its HTTP router.

pub mod flows;
