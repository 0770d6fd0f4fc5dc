use std::ffi::c_void;

use uuid::Uuid;
use windows::core::{Interface, GUID, HRESULT, IUnknown};
use windows::Win32::Foundation::{E_NOINTERFACE, S_OK};
use windows::Win32::System::Com::{
    CoGetClassObject, CoInitializeEx, CoUninitialize, IClassFactory, CLSCTX,
    CLSCTX_INPROC_HANDLER, CLSCTX_INPROC_SERVER, CLSCTX_LOCAL_SERVER, COINIT_APARTMENTTHREADED,
};

use crate::probe::{ActivatableClass, ActivationError, Activator, ComInstance};

/// Keeps COM initialized on the current thread; uninitializes on drop.
#[derive(Debug)]
pub struct ComApartment {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl ComApartment {
    pub fn initialize() -> Result<Self, ActivationError> {
        unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) }.ok().map_err(from_win)?;
        Ok(Self { _not_send: std::marker::PhantomData })
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        unsafe { CoUninitialize() };
    }
}

/// Activator backed by the COM runtime.
///
/// Only local activation contexts are requested: classes that need a remote
/// server resolve as not activatable.
#[derive(Debug)]
pub struct ComActivator {
    _apartment: ComApartment,
    context: CLSCTX,
}

impl ComActivator {
    pub fn new() -> Result<Self, ActivationError> {
        Ok(Self {
            _apartment: ComApartment::initialize()?,
            context: CLSCTX_INPROC_SERVER | CLSCTX_INPROC_HANDLER | CLSCTX_LOCAL_SERVER,
        })
    }
}

impl Activator for ComActivator {
    fn resolve(&self, clsid: Uuid) -> Result<Box<dyn ActivatableClass>, ActivationError> {
        let guid = GUID::from_u128(clsid.as_u128());
        let factory: IClassFactory =
            unsafe { CoGetClassObject(&guid, self.context, None) }.map_err(from_win)?;
        Ok(Box::new(ComClassFactory { factory }))
    }
}

struct ComClassFactory {
    factory: IClassFactory,
}

impl ActivatableClass for ComClassFactory {
    fn instantiate(&self) -> Result<Box<dyn ComInstance>, ActivationError> {
        let unknown: IUnknown = unsafe { self.factory.CreateInstance(None::<&IUnknown>) }.map_err(from_win)?;
        Ok(Box::new(ComObject { unknown }))
    }
}

struct ComObject {
    unknown: IUnknown,
}

impl ComInstance for ComObject {
    fn negotiate(&self, iid: Uuid) -> Result<bool, ActivationError> {
        let guid = GUID::from_u128(iid.as_u128());
        let mut ptr: *mut c_void = std::ptr::null_mut();
        let hr = unsafe { self.unknown.query(&guid, &mut ptr) };
        if !ptr.is_null() {
            // Balance the AddRef performed by QueryInterface.
            drop(unsafe { IUnknown::from_raw(ptr) });
        }
        query_outcome(hr)
    }
}

/// Only `S_OK` means supported; other success codes such as `S_FALSE` do not.
fn query_outcome(hr: HRESULT) -> Result<bool, ActivationError> {
    if hr == S_OK {
        Ok(true)
    } else if hr == E_NOINTERFACE || hr.is_ok() {
        Ok(false)
    } else {
        Err(from_hresult(hr))
    }
}

fn from_win(err: windows::core::Error) -> ActivationError {
    ActivationError::with_code(err.code().0, err.to_string())
}

fn from_hresult(hr: HRESULT) -> ActivationError {
    ActivationError::with_code(hr.0, format!("HRESULT 0x{:08X}", hr.0 as u32))
}
