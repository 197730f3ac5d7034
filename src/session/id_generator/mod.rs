use crate::SessionId;
use rand::Rng;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::{Builder, Uuid};

/// A type with the ability to generate session ids.
///
/// A generator is shared by all requests handled by one
/// [`SessionMiddleware`](crate::SessionMiddleware), hence it takes `&self`.
pub trait SessionIdGenerator: Debug + Send + Sync {
    /// Generate a session id.
    fn generate(&self) -> SessionId;
}

/// The default session id generator.
/// It produces random (version 4) UUIDs from [`rand::thread_rng`], which is cryptographically secure.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSessionIdGenerator;

impl SessionIdGenerator for RandomSessionIdGenerator {
    fn generate(&self) -> SessionId {
        let bytes: [u8; 16] = rand::thread_rng().gen();
        SessionId::from_uuid(Builder::from_random_bytes(bytes).into_uuid())
    }
}

/// A debug session id generator that generates an ascending sequence of UUIDs, starting at the nil UUID.
///
/// Two fresh instances produce the same sequence, which makes it useful in tests.
#[derive(Debug, Default)]
pub struct DebugSessionIdGenerator {
    next_index: AtomicU64,
}

impl SessionIdGenerator for DebugSessionIdGenerator {
    fn generate(&self) -> SessionId {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        SessionId::from_uuid(Uuid::from_u128(u128::from(index)))
    }
}
