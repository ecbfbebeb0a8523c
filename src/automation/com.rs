//! COM adapter: `IDispatch` late binding against the AutoCAD object model.

use super::{AutomationApp, AutomationBackend, AutomationDocument, AutomationFault};
use serde_json::Value;
use std::ptr;
use windows::core::{Interface, IUnknown, BSTR, GUID, PCWSTR, VARIANT};
use windows::Win32::System::Com::{
    CLSIDFromProgID, CoCreateInstance, CoInitializeEx, CoUninitialize, IDispatch,
    CLSCTX_LOCAL_SERVER, COINIT_APARTMENTTHREADED, DISPATCH_FLAGS, DISPATCH_METHOD,
    DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS,
};
use windows::Win32::System::Ole::GetActiveObject;

const LOCALE_USER_DEFAULT: u32 = 0x0400;
const DISPID_PROPERTYPUT: i32 = -3;

/// Single-threaded apartment COM backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComBackend;

impl AutomationBackend for ComBackend {
    fn name(&self) -> &'static str {
        "com"
    }

    fn initialize_thread(&self) -> Result<(), AutomationFault> {
        unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) }
            .ok()
            .map_err(|e| AutomationFault::Unavailable(format!("CoInitializeEx failed: {e}")))
    }

    fn uninitialize_thread(&self) {
        unsafe { CoUninitialize() };
    }

    fn attach(&self, prog_id: &str) -> Result<Box<dyn AutomationApp>, AutomationFault> {
        let clsid = clsid_for(prog_id)?;
        let mut unknown: Option<IUnknown> = None;
        unsafe { GetActiveObject(&clsid, None, &mut unknown) }
            .map_err(|e| AutomationFault::Unavailable(format!("{prog_id} is not running: {e}")))?;
        let unknown = unknown
            .ok_or_else(|| AutomationFault::Unavailable(format!("{prog_id} is not running")))?;
        let dispatch = unknown
            .cast::<IDispatch>()
            .map_err(|e| AutomationFault::call("QueryInterface", e.to_string()))?;
        Ok(Box::new(ComApp(Dispatch(dispatch))))
    }

    fn launch(&self, prog_id: &str) -> Result<Box<dyn AutomationApp>, AutomationFault> {
        let clsid = clsid_for(prog_id)?;
        let dispatch: IDispatch = unsafe { CoCreateInstance(&clsid, None, CLSCTX_LOCAL_SERVER) }
            .map_err(|e| AutomationFault::Unavailable(format!("failed to launch {prog_id}: {e}")))?;
        Ok(Box::new(ComApp(Dispatch(dispatch))))
    }
}

fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

fn clsid_for(prog_id: &str) -> Result<GUID, AutomationFault> {
    let name = wide(prog_id);
    unsafe { CLSIDFromProgID(PCWSTR(name.as_ptr())) }
        .map_err(|e| AutomationFault::Unavailable(format!("unknown ProgID {prog_id}: {e}")))
}

/// Late-bound `IDispatch` calls by member name.
struct Dispatch(IDispatch);

impl Dispatch {
    fn dispid(&self, member: &'static str) -> Result<i32, AutomationFault> {
        let name = wide(member);
        let names = [PCWSTR(name.as_ptr())];
        let mut id = 0i32;
        unsafe {
            self.0
                .GetIDsOfNames(&GUID::zeroed(), names.as_ptr(), 1, LOCALE_USER_DEFAULT, &mut id)
        }
        .map_err(|e| AutomationFault::call(member, e.to_string()))?;
        Ok(id)
    }

    fn invoke(
        &self,
        member: &'static str,
        flags: DISPATCH_FLAGS,
        mut args: Vec<VARIANT>,
    ) -> Result<VARIANT, AutomationFault> {
        let id = self.dispid(member)?;
        // DISPPARAMS takes arguments right to left.
        args.reverse();
        let mut named_put = DISPID_PROPERTYPUT;
        let is_put = flags == DISPATCH_PROPERTYPUT;
        let params = DISPPARAMS {
            rgvarg: if args.is_empty() {
                ptr::null_mut()
            } else {
                args.as_mut_ptr()
            },
            rgdispidNamedArgs: if is_put {
                &mut named_put
            } else {
                ptr::null_mut()
            },
            cArgs: args.len() as u32,
            cNamedArgs: u32::from(is_put),
        };
        let mut result = VARIANT::default();
        unsafe {
            self.0.Invoke(
                id,
                &GUID::zeroed(),
                LOCALE_USER_DEFAULT,
                flags,
                &params,
                Some(&mut result),
                None,
                None,
            )
        }
        .map_err(|e| AutomationFault::call(member, e.to_string()))?;
        Ok(result)
    }

    fn get(&self, member: &'static str) -> Result<VARIANT, AutomationFault> {
        self.invoke(member, DISPATCH_PROPERTYGET, Vec::new())
    }

    fn get_string(&self, member: &'static str) -> Result<String, AutomationFault> {
        let value = self.get(member)?;
        BSTR::try_from(&value)
            .map(|s| s.to_string())
            .map_err(|e| AutomationFault::call(member, e.to_string()))
    }

    fn get_bool(&self, member: &'static str) -> Result<bool, AutomationFault> {
        let value = self.get(member)?;
        bool::try_from(&value).map_err(|e| AutomationFault::call(member, e.to_string()))
    }

    fn get_i32(&self, member: &'static str) -> Result<i32, AutomationFault> {
        let value = self.get(member)?;
        i32::try_from(&value).map_err(|e| AutomationFault::call(member, e.to_string()))
    }

    fn get_object(&self, member: &'static str) -> Result<Dispatch, AutomationFault> {
        let value = self.get(member)?;
        object_from(member, &value)
    }

    fn put(&self, member: &'static str, value: VARIANT) -> Result<(), AutomationFault> {
        self.invoke(member, DISPATCH_PROPERTYPUT, vec![value])
            .map(|_| ())
    }

    fn call(&self, member: &'static str, args: Vec<VARIANT>) -> Result<VARIANT, AutomationFault> {
        self.invoke(member, DISPATCH_METHOD, args)
    }
}

fn object_from(member: &'static str, value: &VARIANT) -> Result<Dispatch, AutomationFault> {
    let unknown =
        IUnknown::try_from(value).map_err(|e| AutomationFault::call(member, e.to_string()))?;
    unknown
        .cast::<IDispatch>()
        .map(Dispatch)
        .map_err(|e| AutomationFault::call(member, e.to_string()))
}

fn text(value: &str) -> VARIANT {
    VARIANT::from(BSTR::from(value))
}

struct ComApp(Dispatch);

impl ComApp {
    /// `Application.Preferences.Files`
    fn files(&self) -> Result<Dispatch, AutomationFault> {
        self.0.get_object("Preferences")?.get_object("Files")
    }
}

impl AutomationApp for ComApp {
    fn name(&self) -> Result<String, AutomationFault> {
        self.0.get_string("Name")
    }

    fn set_visible(&self, visible: bool) -> Result<(), AutomationFault> {
        self.0.put("Visible", VARIANT::from(visible))
    }

    fn support_path(&self) -> Result<String, AutomationFault> {
        self.files()?.get_string("SupportPath")
    }

    fn set_support_path(&self, path: &str) -> Result<(), AutomationFault> {
        self.files()?.put("SupportPath", text(path))
    }

    fn active_document(&self) -> Result<Option<Box<dyn AutomationDocument>>, AutomationFault> {
        let documents = self.0.get_object("Documents")?;
        if documents.get_i32("Count")? == 0 {
            return Ok(None);
        }
        let document = self.0.get_object("ActiveDocument")?;
        Ok(Some(Box::new(ComDocument(document))))
    }

    fn add_document(&self) -> Result<Box<dyn AutomationDocument>, AutomationFault> {
        let documents = self.0.get_object("Documents")?;
        let added = documents.call("Add", Vec::new())?;
        Ok(Box::new(ComDocument(object_from("Add", &added)?)))
    }
}

struct ComDocument(Dispatch);

impl AutomationDocument for ComDocument {
    fn name(&self) -> Result<String, AutomationFault> {
        self.0.get_string("Name")
    }

    fn full_name(&self) -> Result<String, AutomationFault> {
        self.0.get_string("FullName")
    }

    fn saved(&self) -> Result<bool, AutomationFault> {
        self.0.get_bool("Saved")
    }

    fn read_only(&self) -> Result<bool, AutomationFault> {
        self.0.get_bool("ReadOnly")
    }

    fn send_command(&self, command: &str) -> Result<Option<Value>, AutomationFault> {
        let result = self.0.call("SendCommand", vec![text(command)])?;
        if result.is_empty() {
            return Ok(None);
        }
        Ok(BSTR::try_from(&result)
            .ok()
            .map(|s| Value::String(s.to_string())))
    }

    fn save_as(&self, path: &str) -> Result<(), AutomationFault> {
        self.0.call("SaveAs", vec![text(path)]).map(|_| ())
    }
}
