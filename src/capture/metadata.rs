// metadata.rs: Foreground application, its front window title, and the
// frame resolution. Best-effort: missing data is simply absent.

use super::screen::CapturedFrame;

/// Normal application window layer; menu bar, dock and overlays sit above it.
pub const NORMAL_WINDOW_LAYER: i64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextMetadata {
    pub frontmost_app_name: Option<String>,
    pub frontmost_window_title: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl ContextMetadata {
    /// Non-empty metadata lines in display order: app, window title, resolution.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(3);
        if let Some(app) = non_empty(&self.frontmost_app_name) {
            lines.push(format!("Frontmost app: {}", app));
        }
        if let Some(title) = non_empty(&self.frontmost_window_title) {
            lines.push(format!("Window title: {}", title));
        }
        lines.push(format!("Resolution: {}x{}", self.width, self.height));
        lines
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningApp {
    pub pid: i32,
    pub name: Option<String>,
}

/// One entry of the on-screen window list, front to back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEntry {
    pub owner_pid: i32,
    pub layer: i64,
    pub title: Option<String>,
}

/// OS queries needed for metadata.
pub trait DesktopInspector: Send + Sync {
    fn frontmost_app(&self) -> Option<RunningApp>;

    /// On-screen windows in front-to-back order, desktop elements excluded.
    fn on_screen_windows(&self) -> Vec<WindowEntry>;
}

/// Title of the first normal-layer window owned by `pid`, if it has one.
pub fn front_window_title(windows: &[WindowEntry], pid: i32) -> Option<String> {
    windows
        .iter()
        .find(|w| w.owner_pid == pid && w.layer == NORMAL_WINDOW_LAYER)
        .and_then(|w| w.title.clone())
        .filter(|t| !t.is_empty())
}

pub fn collect_metadata(inspector: &dyn DesktopInspector, frame: &CapturedFrame) -> ContextMetadata {
    let mut meta = ContextMetadata {
        width: frame.width(),
        height: frame.height(),
        ..Default::default()
    };

    if let Some(app) = inspector.frontmost_app() {
        meta.frontmost_window_title = front_window_title(&inspector.on_screen_windows(), app.pid);
        meta.frontmost_app_name = app.name;
    }
    meta
}

/// The inspector for the current platform.
pub fn platform_inspector() -> Box<dyn DesktopInspector> {
    #[cfg(target_os = "macos")]
    {
        Box::new(macos::MacInspector)
    }
    #[cfg(not(target_os = "macos"))]
    {
        Box::new(NoopInspector)
    }
}

/// Reports nothing; used where no foreground-window query is implemented.
#[derive(Debug, Default)]
pub struct NoopInspector;

impl DesktopInspector for NoopInspector {
    fn frontmost_app(&self) -> Option<RunningApp> {
        None
    }

    fn on_screen_windows(&self) -> Vec<WindowEntry> {
        Vec::new()
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use super::{DesktopInspector, RunningApp, WindowEntry};
    use core_foundation::base::{CFType, TCFType};
    use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
    use core_foundation::number::CFNumber;
    use core_foundation::string::{CFString, CFStringRef};
    use core_graphics::window::{
        copy_window_info, kCGNullWindowID, kCGWindowLayer, kCGWindowListExcludeDesktopElements,
        kCGWindowListOptionOnScreenOnly, kCGWindowName, kCGWindowOwnerPID,
    };
    use objc2_app_kit::NSWorkspace;

    pub struct MacInspector;

    impl DesktopInspector for MacInspector {
        #[allow(unused_unsafe)]
        fn frontmost_app(&self) -> Option<RunningApp> {
            unsafe {
                let workspace = NSWorkspace::sharedWorkspace();
                let app = workspace.frontmostApplication()?;
                Some(RunningApp {
                    pid: app.processIdentifier(),
                    name: app.localizedName().map(|n| n.to_string()),
                })
            }
        }

        fn on_screen_windows(&self) -> Vec<WindowEntry> {
            let options = kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements;
            let Some(list) = copy_window_info(options, kCGNullWindowID) else {
                log::debug!("CGWindowListCopyWindowInfo returned nothing");
                return Vec::new();
            };

            list.iter()
                .filter_map(|item| {
                    // Each element is a CFDictionary owned by the array.
                    let dict: CFDictionary<CFString, CFType> =
                        unsafe { CFDictionary::wrap_under_get_rule(*item as CFDictionaryRef) };
                    let owner_pid = number(&dict, unsafe { kCGWindowOwnerPID })?.to_i32()?;
                    let layer = number(&dict, unsafe { kCGWindowLayer })?.to_i64()?;
                    let title = dict
                        .find(key(unsafe { kCGWindowName }))
                        .and_then(|v| v.downcast::<CFString>())
                        .map(|s| s.to_string());
                    Some(WindowEntry {
                        owner_pid,
                        layer,
                        title,
                    })
                })
                .collect()
        }
    }

    fn key(raw: CFStringRef) -> CFString {
        unsafe { CFString::wrap_under_get_rule(raw) }
    }

    fn number(dict: &CFDictionary<CFString, CFType>, raw: CFStringRef) -> Option<CFNumber> {
        dict.find(key(raw)).and_then(|v| v.downcast::<CFNumber>())
    }
}
