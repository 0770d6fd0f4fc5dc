use windows::core::{HSTRING, PCWSTR, PWSTR};
use windows::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_MORE_DATA, ERROR_NO_MORE_ITEMS, WIN32_ERROR};
use windows::Win32::System::Registry::{
    RegCloseKey, RegEnumKeyExW, RegGetValueW, RegOpenKeyExW, HKEY, HKEY_CLASSES_ROOT,
    HKEY_LOCAL_MACHINE, KEY_READ, REG_ROUTINE_FLAGS, RRF_RT_REG_SZ,
};

use crate::model::{non_empty, ClassRecord, ClassServerInfo, InterfaceRecord};
use crate::source::{ClassCatalog, IdentifierSource, SourceError, SourceResult};

/// String values only. `RRF_RT_REG_SZ` on its own also accepts `REG_EXPAND_SZ`
/// and expands it; adding `RRF_RT_REG_EXPAND_SZ` without `RRF_NOEXPAND` is an
/// invalid combination that fails every read.
const DEFAULT_VALUE_FLAGS: REG_ROUTINE_FLAGS = RRF_RT_REG_SZ;

/// Class registration scopes, in precedence order.
const CLASS_SCOPES: &[(HKEY, &str, &str)] = &[
    (HKEY_CLASSES_ROOT, "HKCR", "CLSID"),
    (HKEY_LOCAL_MACHINE, "HKLM", r"SOFTWARE\WOW6432Node\Classes\CLSID"),
];

/// Interface registration scopes. Both are read; overlap is expected.
const INTERFACE_SCOPES: &[(HKEY, &str, &str)] = &[
    (HKEY_LOCAL_MACHINE, "HKLM", r"SOFTWARE\Classes\Interface"),
    (HKEY_CLASSES_ROOT, "HKCR", "Interface"),
];

/// Identifier source reading the live Windows registry.
#[derive(Debug, Default)]
pub struct RegistrySource;

impl RegistrySource {
    pub fn new() -> Self {
        Self
    }
}

impl IdentifierSource for RegistrySource {
    fn classes(&self) -> SourceResult<Vec<ClassRecord>> {
        let mut catalog = ClassCatalog::new();
        for (root, root_name, path) in CLASS_SCOPES {
            let label = format!(r"{root_name}\{path}");
            let Some(scope) = RegKey::open(*root, path, &label)? else {
                tracing::warn!(scope = %label, "class scope missing; skipping");
                continue;
            };
            for name in scope.subkey_names()? {
                let class_key = match scope.open_child(&name)? {
                    Some(key) => key,
                    None => continue,
                };
                catalog.add(read_class(&name, &class_key));
            }
            tracing::info!(scope = %label, total = catalog.len(), "enumerated class scope");
        }
        Ok(catalog.into_classes())
    }

    fn interfaces(&self) -> SourceResult<Vec<InterfaceRecord>> {
        let mut out = Vec::new();
        for (root, root_name, path) in INTERFACE_SCOPES {
            let label = format!(r"{root_name}\{path}");
            let Some(scope) = RegKey::open(*root, path, &label)? else {
                tracing::warn!(scope = %label, "interface scope missing; skipping");
                continue;
            };
            for name in scope.subkey_names()? {
                let display = scope.default_value(Some(&name));
                out.push(InterfaceRecord::new(name).with_name(non_empty(display)));
            }
            tracing::info!(scope = %label, total = out.len(), "enumerated interface scope");
        }
        Ok(out)
    }

    fn describe(&self) -> String {
        "windows registry".to_string()
    }
}

fn read_class(name: &str, key: &RegKey) -> ClassRecord {
    let server = ClassServerInfo {
        inproc_server32: non_empty(key.default_value(Some("InprocServer32"))),
        prog_id: non_empty(key.default_value(Some("ProgID"))),
        inproc_handler32: non_empty(key.default_value(Some("InprocHandler32"))),
        local_server32: non_empty(key.default_value(Some("LocalServer32"))),
        version: non_empty(key.default_value(Some("Version"))),
    };
    ClassRecord::new(name).with_name(non_empty(key.default_value(None))).with_server(server)
}

/// Owned registry handle, closed on drop.
struct RegKey {
    hkey: HKEY,
    label: String,
}

impl RegKey {
    /// Open `path` under `parent` for reading. A missing key yields `Ok(None)`.
    fn open(parent: HKEY, path: &str, label: &str) -> SourceResult<Option<Self>> {
        let mut hkey = HKEY::default();
        let status =
            unsafe { RegOpenKeyExW(parent, &HSTRING::from(path), 0, KEY_READ, &mut hkey) };
        if status.is_err() {
            tracing::debug!(key = %label, code = status.0, "registry key not opened");
            return Ok(None);
        }
        Ok(Some(Self { hkey, label: label.to_string() }))
    }

    fn open_child(&self, name: &str) -> SourceResult<Option<Self>> {
        Self::open(self.hkey, name, &format!(r"{}\{name}", self.label))
    }

    fn subkey_names(&self) -> SourceResult<Vec<String>> {
        let mut names = Vec::new();
        let mut index = 0u32;
        loop {
            // Registry key names are limited to 255 characters.
            let mut buf = [0u16; 256];
            let mut len = buf.len() as u32;
            let status = unsafe {
                RegEnumKeyExW(
                    self.hkey,
                    index,
                    PWSTR(buf.as_mut_ptr()),
                    &mut len,
                    None,
                    PWSTR::null(),
                    None,
                    None,
                )
            };
            if status == ERROR_NO_MORE_ITEMS {
                break;
            }
            check(status, &self.label)?;
            names.push(String::from_utf16_lossy(&buf[..len as usize]));
            index += 1;
        }
        Ok(names)
    }

    /// Read the default (unnamed) string value of this key or of `subkey`.
    ///
    /// `REG_EXPAND_SZ` values come back expanded.
    fn default_value(&self, subkey: Option<&str>) -> Option<String> {
        let subkey_name = subkey;
        let subkey = subkey.map(HSTRING::from);
        let subkey_ptr = subkey.as_ref().map(|s| PCWSTR(s.as_ptr())).unwrap_or(PCWSTR::null());

        let mut size = 0u32;
        let status = unsafe {
            RegGetValueW(
                self.hkey,
                subkey_ptr,
                PCWSTR::null(),
                DEFAULT_VALUE_FLAGS,
                None,
                None,
                Some(&mut size as *mut u32),
            )
        };
        if status.is_err() {
            if status != ERROR_FILE_NOT_FOUND {
                tracing::debug!(
                    key = %self.label,
                    subkey = subkey_name.unwrap_or(""),
                    code = status.0,
                    "default value not read"
                );
            }
            return None;
        }
        if size == 0 {
            return None;
        }

        // An expanded value can grow between the size query and the read.
        for _ in 0..3 {
            let mut buf = vec![0u16; (size as usize).div_ceil(2)];
            let status = unsafe {
                RegGetValueW(
                    self.hkey,
                    subkey_ptr,
                    PCWSTR::null(),
                    DEFAULT_VALUE_FLAGS,
                    None,
                    Some(buf.as_mut_ptr().cast()),
                    Some(&mut size as *mut u32),
                )
            };
            if status.is_ok() {
                let chars = (size as usize / 2).min(buf.len());
                buf.truncate(chars);
                let value = String::from_utf16_lossy(&buf);
                return Some(value.trim_end_matches('\0').to_string());
            }
            if status != ERROR_MORE_DATA {
                tracing::debug!(
                    key = %self.label,
                    subkey = subkey_name.unwrap_or(""),
                    code = status.0,
                    "default value not read"
                );
                return None;
            }
        }
        None
    }
}

impl Drop for RegKey {
    fn drop(&mut self) {
        let _ = unsafe { RegCloseKey(self.hkey) };
    }
}

fn check(status: WIN32_ERROR, label: &str) -> SourceResult<()> {
    status
        .ok()
        .map_err(|e| SourceError::Registry { key: label.to_string(), message: e.to_string() })
}

#[cfg(test)]
mod tests {
    use windows::Win32::System::Registry::{
        RegCreateKeyW, RegDeleteTreeW, RegSetValueExW, HKEY_CURRENT_USER, REG_EXPAND_SZ, REG_SZ,
        REG_VALUE_TYPE,
    };

    use super::*;

    /// Scratch key under HKCU, deleted on drop.
    struct ScratchKey {
        path: String,
    }

    impl ScratchKey {
        fn create() -> Self {
            let path = format!(r"Software\commap-tests\{}", std::process::id());
            let scratch = Self { path };
            scratch.key(None);
            scratch
        }

        fn key(&self, child: Option<&str>) -> HKEY {
            let path = match child {
                Some(child) => format!(r"{}\{child}", self.path),
                None => self.path.clone(),
            };
            let mut hkey = HKEY::default();
            let status =
                unsafe { RegCreateKeyW(HKEY_CURRENT_USER, &HSTRING::from(path), &mut hkey) };
            assert!(status.is_ok(), "create key: {status:?}");
            hkey
        }

        fn set_default(&self, child: Option<&str>, kind: REG_VALUE_TYPE, value: &str) {
            let hkey = self.key(child);
            let bytes: Vec<u8> = value
                .encode_utf16()
                .chain(Some(0))
                .flat_map(|unit| unit.to_le_bytes())
                .collect();
            let status = unsafe { RegSetValueExW(hkey, PCWSTR::null(), 0, kind, Some(&bytes)) };
            let _ = unsafe { RegCloseKey(hkey) };
            assert!(status.is_ok(), "set value: {status:?}");
        }
    }

    impl Drop for ScratchKey {
        fn drop(&mut self) {
            let _ = unsafe { RegDeleteTreeW(HKEY_CURRENT_USER, &HSTRING::from(self.path.as_str())) };
        }
    }

    #[test]
    fn reads_class_name_and_server_values() {
        let scratch = ScratchKey::create();
        scratch.set_default(None, REG_SZ, "Sample");
        scratch.set_default(Some("InprocServer32"), REG_EXPAND_SZ, r"%SystemRoot%\sample.dll");
        scratch.set_default(Some("ProgID"), REG_SZ, "Sample.Object.1");
        scratch.set_default(Some("Version"), REG_SZ, "  ");

        let key = RegKey::open(HKEY_CURRENT_USER, &scratch.path, "HKCU\\scratch")
            .expect("open")
            .expect("scratch key exists");
        let class = read_class("{AAAAAAAA-0000-0000-0000-000000000001}", &key);

        assert_eq!(class.name.as_deref(), Some("Sample"));
        assert_eq!(class.server.prog_id.as_deref(), Some("Sample.Object.1"));
        let server = class.server.inproc_server32.expect("InprocServer32 read");
        assert!(server.ends_with(r"\sample.dll"));
        assert!(!server.contains('%'), "expected expansion, got {server}");
        assert_eq!(class.server.version, None);
        assert_eq!(class.server.local_server32, None);
    }
}
