//! Native Handle Pool: typed, owning wrappers around raw native handles.
//!
//! A [`Handle`] is live from the moment [`HandlePool::create`] returns until
//! it is dropped, at which point the backend's destroy runs exactly once.
//! Moving a handle moves the release obligation with it.

use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;

use crate::error::{BridgeError, Result};
use crate::native::{HandleKind, NativeApi, RawHandle};

mod sealed {
    pub trait Sealed {}
}

/// Compile-time handle kind.
pub trait Kind: sealed::Sealed {
    const KIND: HandleKind;
}

macro_rules! handle_kinds {
    ($($(#[$doc:meta])* $name:ident => $kind:ident;)*) => {
        $(
            $(#[$doc])*
            #[derive(Debug)]
            pub enum $name {}

            impl sealed::Sealed for $name {}

            impl Kind for $name {
                const KIND: HandleKind = HandleKind::$kind;
            }
        )*
    };
}

/// Marker types naming each handle kind.
pub mod kind {
    use super::{sealed, HandleKind, Kind};

    handle_kinds! {
        /// `f64` matrix.
        Matrix => Matrix;
        /// `i32` sequence.
        IntVector => IntVector;
        /// 2D point sequence.
        Points => PointSequence;
        /// Sequence of 2D point sequences.
        NestedPoints => NestedPointSequence;
        /// Sequence of 3D point sequences.
        NestedPoints3 => NestedPoint3Sequence;
        /// Boolean byte.
        Flag => Flag;
    }
}

/// Owned native handle of kind `K`, borrowed from backend `'n`.
pub struct Handle<'n, K: Kind> {
    raw: RawHandle,
    api: &'n dyn NativeApi,
    _kind: PhantomData<K>,
}

impl<'n, K: Kind> Handle<'n, K> {
    #[inline]
    pub fn kind(&self) -> HandleKind {
        K::KIND
    }

    #[inline]
    pub fn as_raw(&self) -> RawHandle {
        self.raw
    }

    #[inline]
    pub fn api(&self) -> &'n dyn NativeApi {
        self.api
    }

    /// True if this handle was created by `api`.
    ///
    /// Backends are told apart by address and [`NativeApi::name`]. Zero-sized
    /// backends can share an address, so distinct zero-sized backend types
    /// must report distinct names.
    pub fn belongs_to(&self, api: &dyn NativeApi) -> bool {
        std::ptr::addr_eq(self.api, api) && self.api.name() == api.name()
    }

    /// Fail with [`BridgeError::ForeignHandle`] unless this handle was created by `api`.
    pub fn ensure_owned_by(&self, api: &dyn NativeApi) -> Result<()> {
        if self.belongs_to(api) {
            Ok(())
        } else {
            Err(BridgeError::ForeignHandle { kind: K::KIND })
        }
    }

    /// Release now. Equivalent to dropping the handle.
    pub fn destroy(self) {
        drop(self);
    }

    /// Give up ownership without releasing. The caller becomes responsible
    /// for handing the pointer back through [`Handle::from_raw`] or to
    /// foreign code that destroys it.
    pub fn into_raw(self) -> RawHandle {
        let this = ManuallyDrop::new(self);
        log::trace!("{:?} handle {:p} released to caller", K::KIND, this.raw);
        this.raw
    }

    /// Reclaim ownership of a raw handle.
    ///
    /// # Safety
    /// `raw` must be a live handle of kind `K` created by `api`, and no other
    /// owner may release it.
    pub unsafe fn from_raw(api: &'n dyn NativeApi, raw: RawHandle) -> Self {
        Self {
            raw,
            api,
            _kind: PhantomData,
        }
    }
}

impl<K: Kind> Drop for Handle<'_, K> {
    fn drop(&mut self) {
        log::trace!(
            "destroy {:?} handle {:p} on {}",
            K::KIND,
            self.raw,
            self.api.name()
        );
        // SAFETY: the handle is live, of kind `K`, and owned solely by `self`.
        unsafe { self.api.destroy(K::KIND, self.raw) }
    }
}

impl<K: Kind> fmt::Debug for Handle<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &K::KIND)
            .field("raw", &self.raw)
            .field("backend", &self.api.name())
            .finish()
    }
}

/// Creates handles on one native backend.
#[derive(Clone, Copy)]
pub struct HandlePool<'n> {
    api: &'n dyn NativeApi,
}

impl<'n> HandlePool<'n> {
    pub fn new(api: &'n dyn NativeApi) -> Self {
        Self { api }
    }

    #[inline]
    pub fn api(&self) -> &'n dyn NativeApi {
        self.api
    }

    /// Allocate a fresh handle of kind `K`.
    pub fn create<K: Kind>(&self) -> Result<Handle<'n, K>> {
        let raw = self
            .api
            .create(K::KIND)
            .ok_or(BridgeError::Allocation { kind: K::KIND })?;
        log::trace!("create {:?} handle {:p} on {}", K::KIND, raw, self.api.name());
        Ok(Handle {
            raw,
            api: self.api,
            _kind: PhantomData,
        })
    }

    pub fn create_matrix(&self) -> Result<Handle<'n, kind::Matrix>> {
        self.create()
    }

    pub fn create_int_vector(&self) -> Result<Handle<'n, kind::IntVector>> {
        self.create()
    }

    pub fn create_point_sequence(&self) -> Result<Handle<'n, kind::Points>> {
        self.create()
    }

    pub fn create_nested_point_sequence(&self) -> Result<Handle<'n, kind::NestedPoints>> {
        self.create()
    }

    pub fn create_nested_point3_sequence(&self) -> Result<Handle<'n, kind::NestedPoints3>> {
        self.create()
    }

    pub fn create_flag(&self) -> Result<Handle<'n, kind::Flag>> {
        self.create()
    }
}

impl fmt::Debug for HandlePool<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlePool")
            .field("backend", &self.api.name())
            .finish()
    }
}
