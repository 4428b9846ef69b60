//! Emulated device profiles applied before navigation.

/// Viewport and user-agent emulation for one device class.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub width: i64,
    pub height: i64,
    pub device_scale_factor: f64,
    pub mobile: bool,
    pub user_agent: String,
}

impl DeviceProfile {
    pub fn desktop(user_agent: impl Into<String>) -> Self {
        Self {
            width: 1920,
            height: 1080,
            device_scale_factor: 1.0,
            mobile: false,
            user_agent: user_agent.into(),
        }
    }

    pub fn mobile(user_agent: impl Into<String>) -> Self {
        Self {
            width: 375,
            height: 812,
            device_scale_factor: 3.0,
            mobile: true,
            user_agent: user_agent.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_differ_in_viewport_and_touch() {
        let desktop = DeviceProfile::desktop("ua");
        let mobile = DeviceProfile::mobile("ua");
        assert!(!desktop.mobile);
        assert!(mobile.mobile);
        assert!(desktop.width > mobile.width);
    }
}
