const DEVICES_PREFIX: &str = "/devices/";
const CONTROLS_SEGMENT: &str = "controls/";

/// A parsed `/devices/{device}/controls/{control}` topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceTopic<'a> {
    pub device: &'a str,
    pub control: &'a str,
}

impl<'a> DeviceTopic<'a> {
    /// Matches the topic from its start. Anything after the control segment is
    /// ignored, so `.../controls/Relay_1/on` is filed under `Relay_1`.
    pub fn parse(topic: &'a str) -> Option<Self> {
        let rest = topic.strip_prefix(DEVICES_PREFIX)?;
        let (device, rest) = rest.split_once('/')?;
        let rest = rest.strip_prefix(CONTROLS_SEGMENT)?;
        let control = rest.split('/').next()?;

        if device.is_empty() || control.is_empty() {
            return None;
        }

        Some(Self { device, control })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(topic: &str) -> Option<(&str, &str)> {
        DeviceTopic::parse(topic).map(|t| (t.device, t.control))
    }

    #[test]
    fn parses_device_and_control() {
        assert_eq!(parts("/devices/A1/controls/Relay_1"), Some(("A1", "Relay_1")));
        assert_eq!(
            parts("/devices/wb-gpio/controls/EXT1_IN 2"),
            Some(("wb-gpio", "EXT1_IN 2"))
        );
    }

    #[test]
    fn trailing_segments_are_ignored() {
        assert_eq!(parts("/devices/A1/controls/Relay_1/on"), Some(("A1", "Relay_1")));
        assert_eq!(
            parts("/devices/A1/controls/Relay_1/meta/type"),
            Some(("A1", "Relay_1"))
        );
        assert_eq!(parts("/devices/A1/controls/controls/x"), Some(("A1", "controls")));
    }

    #[test]
    fn rejects_malformed_topics() {
        for topic in [
            "",
            "/devices/A1",
            "/devices/A1/Relay_1",
            "/devices//controls/Relay_1",
            "/devices/A1/controls/",
            "/devices/A1/controls//Relay_1",
            "devices/A1/controls/Relay_1",
            "/device/A1/controls/Relay_1",
            "/devices/A1/sub/controls/Relay_1",
            "/devices/A1/meta/name",
            "RS-485-2/A1/Relay_1",
        ] {
            assert_eq!(DeviceTopic::parse(topic), None, "accepted {:?}", topic);
        }
    }
}
