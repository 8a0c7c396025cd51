use crate::config::Config;
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
#[cfg(target_os = "macos")]
use std::process::Command;

/// Whether the reminder service is registered with launchd and currently loaded.
#[derive(Debug, Clone)]
pub struct DaemonStatus {
    pub installed: bool,
    pub loaded: bool,
}

pub fn install(config: &Config) -> Result<PathBuf> {
    let plist_path = plist_path(config)?;
    if let Some(parent) = plist_path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!(
                "Failed to create LaunchAgents directory: {}",
                parent.display()
            )
        })?;
    }

    let log_dir = Config::root_dir()?.join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let binary_path =
        std::env::current_exe().context("Failed to resolve current executable path")?;
    let plist = render_plist(&config.daemon_label, &binary_path, &log_dir);

    fs::write(&plist_path, plist)
        .with_context(|| format!("Failed to write launchd plist: {}", plist_path.display()))?;

    Ok(plist_path)
}

pub fn load(config: &Config) -> Result<()> {
    let plist = plist_path(config)?;
    if !plist.exists() {
        bail!(
            "launchd plist not found: {}. Run `RxReminder onboard --install-daemon` first.",
            plist.display()
        );
    }

    #[cfg(target_os = "macos")]
    {
        let domain = format!("gui/{}", user_id());

        let _ = run_launchctl(["bootout", &domain, plist.to_string_lossy().as_ref()]);
        run_launchctl(["bootstrap", &domain, plist.to_string_lossy().as_ref()])?;
        Ok(())
    }

    #[cfg(not(target_os = "macos"))]
    {
        bail!("launchd is only supported on macOS; run `RxReminder service` instead");
    }
}

pub fn unload(config: &Config) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        let domain = format!("gui/{}", user_id());
        let _ = run_launchctl(["bootout", &format!("{domain}/{}", config.daemon_label)]);
        Ok(())
    }

    #[cfg(not(target_os = "macos"))]
    {
        let _ = config;
        bail!("launchd is only supported on macOS");
    }
}

pub fn restart(config: &Config) -> Result<()> {
    unload(config)?;
    load(config)
}

pub fn status(config: &Config) -> Result<DaemonStatus> {
    let installed = plist_path(config)?.exists();

    #[cfg(target_os = "macos")]
    {
        let target = format!("gui/{}/{}", user_id(), config.daemon_label);
        let loaded = run_launchctl(["print", &target]).is_ok();
        return Ok(DaemonStatus { installed, loaded });
    }

    #[cfg(not(target_os = "macos"))]
    {
        Ok(DaemonStatus {
            installed,
            loaded: false,
        })
    }
}

pub fn plist_path(config: &Config) -> Result<PathBuf> {
    let home = dirs::home_dir().context("Failed to resolve HOME directory")?;
    Ok(home
        .join("Library")
        .join("LaunchAgents")
        .join(format!("{}.plist", config.daemon_label)))
}

fn render_plist(label: &str, binary: &Path, log_dir: &Path) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>Label</key>
  <string>{label}</string>
  <key>ProgramArguments</key>
  <array>
    <string>{binary}</string>
    <string>service</string>
  </array>
  <key>RunAtLoad</key>
  <true/>
  <key>KeepAlive</key>
  <true/>
  <key>StandardOutPath</key>
  <string>{stdout}</string>
  <key>StandardErrorPath</key>
  <string>{stderr}</string>
</dict>
</plist>
"#,
        binary = binary.display(),
        stdout = log_dir.join("service.log").display(),
        stderr = log_dir.join("service.err.log").display(),
    )
}

#[cfg(target_os = "macos")]
fn run_launchctl<const N: usize>(args: [&str; N]) -> Result<String> {
    let output = Command::new("launchctl")
        .args(args)
        .output()
        .with_context(|| "Failed to execute launchctl")?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        bail!("launchctl error: {stderr}");
    }
}

#[cfg(target_os = "macos")]
fn user_id() -> u32 {
    unsafe { libc::geteuid() }
}

#[cfg(test)]
mod tests {
    use super::render_plist;
    use std::path::Path;

    #[test]
    fn plist_runs_the_service_subcommand() {
        let plist = render_plist(
            "com.RxReminder.daemon",
            Path::new("/usr/local/bin/RxReminder"),
            Path::new("/Users/me/.RxReminder/logs"),
        );

        assert!(plist.contains("<string>com.RxReminder.daemon</string>"));
        assert!(plist.contains("<string>/usr/local/bin/RxReminder</string>\n    <string>service</string>"));
        assert!(plist.contains("/Users/me/.RxReminder/logs/service.err.log"));
    }
}
