use crate::config::Settings;
use crate::package_manager::PackageManager;
use crate::paths::Layout;
use crate::platform::Platform;
use crate::report::Mode;

/// Everything resolved once at startup. Passed by reference, never mutated.
#[derive(Debug, Clone)]
pub struct Context {
    pub platform: Platform,
    pub package_manager: Option<PackageManager>,
    pub mode: Mode,
    pub settings: Settings,
    pub layout: Layout,
}

impl Context {
    pub fn new(
        platform: Platform,
        package_manager: Option<PackageManager>,
        mode: Mode,
        settings: Settings,
    ) -> Self {
        let layout = settings.layout();
        Self {
            platform,
            package_manager,
            mode,
            settings,
            layout,
        }
    }
}
