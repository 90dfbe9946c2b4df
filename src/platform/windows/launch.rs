//! Windows launch-at-login using the Registry Run key

use anyhow::Result;
use winreg::RegKey;
use winreg::enums::*;

use crate::platform::LoginItem;

const APP_NAME: &str = "TodoFloatingBall";
const RUN_KEY: &str = r"Software\Microsoft\Windows\CurrentVersion\Run";

#[derive(Default)]
pub struct RegistryLoginItem;

impl LoginItem for RegistryLoginItem {
    fn set_enabled(&self, enabled: bool) -> Result<()> {
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        if enabled {
            let exe_path = std::env::current_exe()?;
            // Quoted so paths with spaces survive the shell's split.
            let command = format!("\"{}\"", exe_path.to_string_lossy());
            let (key, _) = hkcu.create_subkey(RUN_KEY)?;
            key.set_value(APP_NAME, &command)?;
            log::info!("Enabled launch-at-login via registry: {}", command);
            return Ok(());
        }

        match hkcu.open_subkey_with_flags(RUN_KEY, KEY_WRITE) {
            Ok(key) => {
                // Ignore error if value doesn't exist
                let _ = key.delete_value(APP_NAME);
                log::info!("Disabled launch-at-login");
                Ok(())
            }
            Err(e) => {
                log::debug!("Registry key not found (already disabled): {}", e);
                Ok(())
            }
        }
    }

    fn is_enabled(&self) -> Result<bool> {
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let key = match hkcu.open_subkey(RUN_KEY) {
            Ok(k) => k,
            Err(_) => return Ok(false),
        };
        Ok(key.get_value::<String, _>(APP_NAME).is_ok())
    }
}
