//! Reference-counted, type-erased payload behind every object handle.

use std::any::Any;
use std::ffi::c_void;
use std::sync::Arc;

use crate::core::types::Handle;
use crate::{BridgeError, BridgeResult};

/// A backend payload bound to the session that minted it.
///
/// Cloning the inner `Arc` is the only way to share a payload, so two handles
/// produced by [`EngineObject::duplicate`] always see the same value and the
/// value is dropped once the last handle is released.
pub struct EngineObject {
    session_id: u64,
    payload: Arc<dyn Any + Send + Sync>,
}

impl EngineObject {
    pub fn wrap<T: Any + Send + Sync>(session_id: u64, value: T) -> Self {
        EngineObject {
            session_id,
            payload: Arc::new(value),
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Typed access to the payload. `None` when `T` is not the wrapped type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.payload).downcast::<T>().ok()
    }

    /// Shares ownership of the payload; no copy of the value is made.
    pub fn duplicate(&self) -> Self {
        EngineObject {
            session_id: self.session_id,
            payload: Arc::clone(&self.payload),
        }
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.payload)
    }

    /// Moves the object onto the heap and hands out its address.
    pub fn into_handle(self, size: u64, tag: u64) -> Handle {
        Handle {
            p: Box::into_raw(Box::new(self)) as *mut c_void,
            size,
            tag,
        }
    }

    /// Reinterprets the pointer of a handle minted by [`EngineObject::into_handle`].
    ///
    /// # Safety
    ///
    /// `h.p` must be null or a pointer returned by `into_handle` that has not
    /// been released yet. Callers check the tag before getting here; this is the
    /// only place the raw pointer is trusted.
    pub unsafe fn from_handle<'a>(h: &Handle) -> BridgeResult<&'a EngineObject> {
        if h.p.is_null() {
            return Err(BridgeError::critical("invalid empty object"));
        }
        // SAFETY: non-null and produced by `into_handle` per the contract above.
        Ok(unsafe { &*(h.p as *const EngineObject) })
    }

    /// Drops the heap object behind `h`, releasing one payload reference.
    ///
    /// # Safety
    ///
    /// Same contract as [`EngineObject::from_handle`]; `h` must not be used
    /// afterwards.
    pub unsafe fn release(h: Handle) -> BridgeResult<()> {
        if h.p.is_null() {
            return Err(BridgeError::critical("invalid empty object"));
        }
        // SAFETY: ownership of the box goes back to Rust exactly once.
        drop(unsafe { Box::from_raw(h.p as *mut EngineObject) });
        Ok(())
    }
}

impl std::fmt::Debug for EngineObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineObject")
            .field("session_id", &self.session_id)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_is_checked() {
        let obj = EngineObject::wrap(1, vec![1u32, 2, 3]);
        assert_eq!(*obj.downcast::<Vec<u32>>().unwrap(), vec![1, 2, 3]);
        assert!(obj.downcast::<String>().is_none());
    }

    #[test]
    fn test_duplicate_shares_payload() {
        let obj = EngineObject::wrap(1, String::from("payload"));
        let dup = obj.duplicate();
        assert_eq!(obj.ref_count(), 2);
        drop(obj);
        assert_eq!(dup.ref_count(), 1);
        assert_eq!(dup.downcast::<String>().unwrap().as_str(), "payload");
    }

    #[test]
    fn test_handle_round_trip_and_release() {
        let h = EngineObject::wrap(9, 42u64).into_handle(8, 0);
        let obj = unsafe { EngineObject::from_handle(&h) }.unwrap();
        assert_eq!(obj.session_id(), 9);
        assert_eq!(*obj.downcast::<u64>().unwrap(), 42);
        unsafe { EngineObject::release(h) }.unwrap();
    }

    #[test]
    fn test_null_handle_is_empty_object() {
        let err = unsafe { EngineObject::from_handle(&Handle::null()) }.unwrap_err();
        assert!(err.is_critical());
        assert!(unsafe { EngineObject::release(Handle::null()) }.is_err());
    }
}
