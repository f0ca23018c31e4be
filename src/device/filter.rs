//! Capture device filtering logic

use super::DeviceInfo;

/// Model name fragments of cards that only have outputs
const OUTPUT_ONLY_MODELS: &[&str] = &["io ip", "t-tap", "kona 5 out"];

/// Filter for deciding which cards can be offered as capture devices
pub struct CaptureFilter;

impl CaptureFilter {
    /// Check if a model name identifies an output-only card
    pub fn is_output_only_model(model: &str) -> bool {
        let model_lower = model.to_lowercase();
        OUTPUT_ONLY_MODELS
            .iter()
            .any(|keyword| model_lower.contains(keyword))
    }

    /// Check if a device can capture at all
    pub fn is_capture_device(info: &DeviceInfo) -> bool {
        !info.output_only
            && !Self::is_output_only_model(&info.model)
            && info.num_sdi_inputs + info.num_hdmi_inputs > 0
    }

    /// Check if a device matches a user-supplied ID or name fragment
    pub fn matches(info: &DeviceInfo, pattern: &str) -> bool {
        if info.card_id == pattern {
            return true;
        }
        let pattern_lower = pattern.to_lowercase();
        info.model.to_lowercase().contains(&pattern_lower)
            || info.card_id.to_lowercase().contains(&pattern_lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(model: &str, sdi: u8, output_only: bool) -> DeviceInfo {
        DeviceInfo {
            card_id: "0x10538700".into(),
            model: model.into(),
            num_channels: 4,
            num_sdi_inputs: sdi,
            num_hdmi_inputs: 0,
            hdmi_version: 0,
            bidirectional_sdi: true,
            output_only,
        }
    }

    #[test]
    fn test_output_only_detection() {
        assert!(CaptureFilter::is_output_only_model("T-TAP Pro"));
        assert!(CaptureFilter::is_output_only_model("Io IP"));
        assert!(!CaptureFilter::is_output_only_model("Corvid 44"));

        assert!(CaptureFilter::is_capture_device(&info("Corvid 44", 4, false)));
        assert!(!CaptureFilter::is_capture_device(&info("Corvid 44", 4, true)));
        assert!(!CaptureFilter::is_capture_device(&info("Corvid 44", 0, false)));
    }

    #[test]
    fn test_pattern_match() {
        let card = info("Kona 4", 4, false);
        assert!(CaptureFilter::matches(&card, "kona"));
        assert!(CaptureFilter::matches(&card, "0x10538700"));
        assert!(!CaptureFilter::matches(&card, "corvid"));
    }
}
