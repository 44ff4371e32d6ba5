use derive_builder::Builder;

use super::BufferError;

/// When missing positions get their concealment generated.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ConcealmentMode {
    /// Positions are concealed only when a dequeue reaches them still empty.
    #[default]
    Lazy,
    /// `prepare` conceals the first `min_depth_elements` positions up front.
    /// Real data arriving before playout replaces the concealment.
    Eager,
}

/// Fixed configuration of a jitter buffer.
///
/// `min_length_ms` and `max_length_ms` bound the buffered depth in wall-clock
/// terms and are turned into element counts through `clock_rate`, the number
/// of elements per second.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(build_fn(error = "BufferError"))]
pub struct JitterBufferConfig {
    pub element_size: usize,
    pub packet_elements: usize,
    pub clock_rate: u64,
    pub max_length_ms: u64,
    pub min_length_ms: u64,
    #[builder(setter(into), default = "String::from(\"jitter\")")]
    pub name: String,
    #[builder(default)]
    pub concealment_mode: ConcealmentMode,
}

/// Depth bounds in elements, derived once from a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthBounds {
    pub min_depth_elements: usize,
    pub max_depth_elements: usize,
}

fn ms_to_elements(length_ms: u64, clock_rate: u64) -> u64 {
    ((length_ms as u128 * clock_rate as u128) / 1000).min(usize::MAX as u128) as u64
}

impl JitterBufferConfig {
    pub fn new(
        element_size: usize,
        packet_elements: usize,
        clock_rate: u64,
        max_length_ms: u64,
        min_length_ms: u64,
    ) -> Self {
        JitterBufferConfig {
            element_size,
            packet_elements,
            clock_rate,
            max_length_ms,
            min_length_ms,
            name: String::from("jitter"),
            concealment_mode: ConcealmentMode::default(),
        }
    }

    pub fn builder() -> JitterBufferConfigBuilder {
        JitterBufferConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<DepthBounds, BufferError> {
        if self.element_size == 0 {
            return Err(BufferError::ZeroElementSize);
        }
        if self.packet_elements == 0 {
            return Err(BufferError::ZeroPacketElements);
        }
        if self.min_length_ms > self.max_length_ms {
            return Err(BufferError::InvalidDepthRange {
                min_length_ms: self.min_length_ms,
                max_length_ms: self.max_length_ms,
            });
        }
        let max_depth_elements = ms_to_elements(self.max_length_ms, self.clock_rate) as usize;
        if max_depth_elements == 0 {
            return Err(BufferError::ZeroCapacity {
                clock_rate: self.clock_rate,
                max_length_ms: self.max_length_ms,
            });
        }
        Ok(DepthBounds {
            min_depth_elements: ms_to_elements(self.min_length_ms, self.clock_rate) as usize,
            max_depth_elements,
        })
    }

    /// Converts an element count back into milliseconds.
    pub fn elements_to_ms(&self, elements: usize) -> u64 {
        if self.clock_rate == 0 {
            return 0;
        }
        ((elements as u128 * 1000) / self.clock_rate as u128) as u64
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_config_derives_depths_from_clock_rate() {
        let bounds = JitterBufferConfig::new(2, 4, 1000, 100, 20).validate().unwrap();
        assert_eq!(
            bounds,
            DepthBounds {
                min_depth_elements: 20,
                max_depth_elements: 100
            }
        );
    }

    #[rstest]
    #[case(48000, 100, 20)]
    #[case(48000, 60, 60)]
    #[case(8000, 1000, 0)]
    #[case(1000, 3, 1)]
    #[case(16000, 250, 249)]
    fn test_config_max_depth_never_below_min_depth(
        #[case] clock_rate: u64,
        #[case] max_length_ms: u64,
        #[case] min_length_ms: u64,
    ) {
        let config = JitterBufferConfig::new(4, 480, clock_rate, max_length_ms, min_length_ms);
        let bounds = config.validate().unwrap();
        assert!(bounds.max_depth_elements >= bounds.min_depth_elements);
        assert_eq!(
            bounds.max_depth_elements as u64,
            max_length_ms * clock_rate / 1000
        );
        assert_eq!(
            bounds.min_depth_elements as u64,
            min_length_ms * clock_rate / 1000
        );
    }

    #[rstest]
    #[case(JitterBufferConfig::new(0, 4, 1000, 100, 20), BufferError::ZeroElementSize)]
    #[case(JitterBufferConfig::new(2, 0, 1000, 100, 20), BufferError::ZeroPacketElements)]
    #[case(
        JitterBufferConfig::new(2, 4, 1000, 20, 100),
        BufferError::InvalidDepthRange { min_length_ms: 100, max_length_ms: 20 }
    )]
    #[case(
        JitterBufferConfig::new(2, 4, 10, 50, 0),
        BufferError::ZeroCapacity { clock_rate: 10, max_length_ms: 50 }
    )]
    #[case(
        JitterBufferConfig::new(2, 4, 1000, 0, 0),
        BufferError::ZeroCapacity { clock_rate: 1000, max_length_ms: 0 }
    )]
    fn test_config_rejects_invalid_parameters(
        #[case] config: JitterBufferConfig,
        #[case] expected: BufferError,
    ) {
        assert_eq!(config.validate().unwrap_err(), expected);
    }

    #[test]
    fn test_config_builder_applies_defaults() {
        let config = JitterBufferConfig::builder()
            .element_size(4)
            .packet_elements(480)
            .clock_rate(48000)
            .max_length_ms(200)
            .min_length_ms(40)
            .build()
            .unwrap();
        assert_eq!(config.name, "jitter");
        assert_eq!(config.concealment_mode, ConcealmentMode::Lazy);
        assert_eq!(config, JitterBufferConfig::new(4, 480, 48000, 200, 40));
    }

    #[test]
    fn test_config_builder_errors_on_missing_field() {
        let result = JitterBufferConfig::builder()
            .element_size(4)
            .packet_elements(480)
            .clock_rate(48000)
            .min_length_ms(40)
            .build();
        assert_eq!(
            result.unwrap_err(),
            BufferError::MissingField("max_length_ms".to_string())
        );
    }

    #[test]
    fn test_config_elements_to_ms() {
        let config = JitterBufferConfig::new(4, 480, 48000, 200, 40);
        assert_eq!(config.elements_to_ms(960), 20);
        assert_eq!(config.elements_to_ms(0), 0);
    }
}
