//! Launch-at-login through auto-launch (LaunchAgent on macOS, XDG autostart
//! entry on Linux).

use anyhow::{Result, anyhow};
use auto_launch::{AutoLaunch, AutoLaunchBuilder};
use log::{debug, info};

use crate::platform::LoginItem;

const APP_NAME: &str = "TodoFloatingBall";

#[derive(Default)]
pub struct AutoLaunchItem;

impl AutoLaunchItem {
    fn auto_launch(&self) -> Result<AutoLaunch> {
        let exe_path = std::env::current_exe()?;
        let app_path = exe_path
            .to_str()
            .ok_or_else(|| anyhow!("Invalid executable path"))?;

        let mut builder = AutoLaunchBuilder::new();
        builder.set_app_name(APP_NAME).set_app_path(app_path);
        #[cfg(target_os = "macos")]
        builder.set_use_launch_agent(true);
        builder
            .build()
            .map_err(|e| anyhow!("Failed to create auto-launch config: {}", e))
    }
}

impl LoginItem for AutoLaunchItem {
    fn set_enabled(&self, enabled: bool) -> Result<()> {
        let auto = self.auto_launch()?;
        if enabled {
            debug!("Enabling launch-at-login");
            auto.enable()
                .map_err(|e| anyhow!("Failed to enable launch-at-login: {}", e))?;
            info!("Enabled launch-at-login for {}", APP_NAME);
        } else {
            debug!("Disabling launch-at-login");
            auto.disable()
                .map_err(|e| anyhow!("Failed to disable launch-at-login: {}", e))?;
        }
        Ok(())
    }

    fn is_enabled(&self) -> Result<bool> {
        self.auto_launch()?
            .is_enabled()
            .map_err(|e| anyhow!("Failed to check launch-at-login status: {}", e))
    }
}
