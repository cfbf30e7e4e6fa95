//! ISO data-path manager: codec-configuration building and handle checks
//!
//! The codec configuration travels to the controller as a sequence of
//! Length-Type-Value entries. For standard codecs the entries are emitted
//! in a fixed order (sampling frequency, frame duration, audio channel
//! allocation, octets per codec frame); the allocation entry is omitted
//! entirely for mono, which shrinks the buffer and its length on the wire.
//! For the recognized vendor codecs the configuration is the raw,
//! already-LTV-formatted vendor payload.

use heapless::Vec;

use crate::constants::{AUDIO_LOCATION_MONO, MAX_CODEC_CONFIG, MAX_ISO_HANDLE, MAX_VENDOR_DATA};

/// LTV type for the sampling frequency entry
pub const LTV_TYPE_SAMPLING_FREQUENCY: u8 = 0x01;
/// LTV type for the frame duration entry
pub const LTV_TYPE_FRAME_DURATION: u8 = 0x02;
/// LTV type for the audio channel allocation entry
pub const LTV_TYPE_CHANNEL_ALLOCATION: u8 = 0x03;
/// LTV type for the octets-per-codec-frame entry
pub const LTV_TYPE_OCTETS_PER_FRAME: u8 = 0x04;

/// Data path direction: host to controller
pub const DATAPATH_DIRECTION_INPUT: u8 = 0x00;
/// Data path direction: controller to host
pub const DATAPATH_DIRECTION_OUTPUT: u8 = 0x01;
/// HCI data path id
pub const DATAPATH_ID_HCI: u8 = 0x00;

/// Codec identifier as carried in ASCS and HCI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecId {
    /// Coding format; `0xFF` selects a vendor codec
    pub coding_format: u8,
    /// Company id for vendor codecs
    pub company_id: u16,
    /// Vendor-assigned codec id
    pub vendor_codec_id: u16,
}

impl CodecId {
    /// LC3 coding format
    pub const CODING_FORMAT_LC3: u8 = 0x06;
    /// Vendor-defined coding format
    pub const CODING_FORMAT_VENDOR: u8 = 0xFF;
    /// Qualcomm Technologies Intl. Ltd. company id
    pub const COMPANY_ID_QUALCOMM: u16 = 0x000A;
    /// aptX / aptX Adaptive vendor codec id
    pub const VS_CODEC_ID_APTX_ADAPTIVE: u16 = 0x0001;
    /// aptX Lite vendor codec id
    pub const VS_CODEC_ID_APTX_LITE: u16 = 0x0002;

    /// The standard LC3 codec id
    #[must_use]
    pub const fn lc3() -> Self {
        Self {
            coding_format: Self::CODING_FORMAT_LC3,
            company_id: 0,
            vendor_codec_id: 0,
        }
    }

    /// A Qualcomm vendor codec id
    #[must_use]
    pub const fn vendor(vendor_codec_id: u16) -> Self {
        Self {
            coding_format: Self::CODING_FORMAT_VENDOR,
            company_id: Self::COMPANY_ID_QUALCOMM,
            vendor_codec_id,
        }
    }

    /// True for the vendor codec family whose configuration is passed
    /// through verbatim instead of being LTV-built here
    #[must_use]
    pub const fn is_recognized_vendor(&self) -> bool {
        self.coding_format == Self::CODING_FORMAT_VENDOR
            && self.company_id == Self::COMPANY_ID_QUALCOMM
            && matches!(
                self.vendor_codec_id,
                Self::VS_CODEC_ID_APTX_ADAPTIVE | Self::VS_CODEC_ID_APTX_LITE
            )
    }

    /// Wire form: coding format followed by company and vendor ids,
    /// little endian
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 5] {
        [
            self.coding_format,
            (self.company_id & 0x00FF) as u8,
            ((self.company_id & 0xFF00) >> 8) as u8,
            (self.vendor_codec_id & 0x00FF) as u8,
            ((self.vendor_codec_id & 0xFF00) >> 8) as u8,
        ]
    }
}

/// Supported sampling frequencies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingFrequency {
    /// 8 kHz
    Hz8000,
    /// 11.025 kHz
    Hz11025,
    /// 16 kHz
    Hz16000,
    /// 22.05 kHz
    Hz22050,
    /// 24 kHz
    Hz24000,
    /// 32 kHz
    Hz32000,
    /// 44.1 kHz
    Hz44100,
    /// 48 kHz
    Hz48000,
    /// 88.2 kHz
    Hz88200,
    /// 96 kHz
    Hz96000,
    /// 176.4 kHz
    Hz176400,
    /// 192 kHz
    Hz192000,
    /// 384 kHz
    Hz384000,
}

impl SamplingFrequency {
    /// Map a sampling rate in Hz onto the supported set
    #[must_use]
    pub const fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            8_000 => Some(Self::Hz8000),
            11_025 => Some(Self::Hz11025),
            16_000 => Some(Self::Hz16000),
            22_050 => Some(Self::Hz22050),
            24_000 => Some(Self::Hz24000),
            32_000 => Some(Self::Hz32000),
            44_100 => Some(Self::Hz44100),
            48_000 => Some(Self::Hz48000),
            88_200 => Some(Self::Hz88200),
            96_000 => Some(Self::Hz96000),
            176_400 => Some(Self::Hz176400),
            192_000 => Some(Self::Hz192000),
            384_000 => Some(Self::Hz384000),
            _ => None,
        }
    }

    /// The 1-byte code used in codec configuration entries
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Hz8000 => 0x01,
            Self::Hz11025 => 0x02,
            Self::Hz16000 => 0x03,
            Self::Hz22050 => 0x04,
            Self::Hz24000 => 0x05,
            Self::Hz32000 => 0x06,
            Self::Hz44100 => 0x07,
            Self::Hz48000 => 0x08,
            Self::Hz88200 => 0x09,
            Self::Hz96000 => 0x0A,
            Self::Hz176400 => 0x0B,
            Self::Hz192000 => 0x0C,
            Self::Hz384000 => 0x0D,
        }
    }
}

/// Codec frame duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDuration {
    /// 7.5 ms frames
    Ms7_5,
    /// 10 ms frames
    Ms10,
}

impl FrameDuration {
    /// Single-bit wire encoding: 10 ms is `0x01`, everything else `0x00`
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Ms10 => 0x01,
            Self::Ms7_5 => 0x00,
        }
    }
}

/// Codec-specific configuration for a standard codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfiguration {
    /// Sampling frequency
    pub sampling_frequency: SamplingFrequency,
    /// Frame duration
    pub frame_duration: FrameDuration,
    /// Audio channel allocation bitmask; `AUDIO_LOCATION_MONO` suppresses
    /// the allocation entry
    pub audio_channel_allocation: u32,
    /// Octets per codec frame
    pub octets_per_frame: u16,
}

/// Parameters for setting up one ISO data path
#[derive(Debug, Clone)]
pub struct DataPathParams {
    /// CIS or BIS handle the path is attached to
    pub iso_handle: u16,
    /// Input or output direction
    pub direction: u8,
    /// Data path id at the controller
    pub path_id: u8,
    /// Codec the path carries
    pub codec_id: CodecId,
    /// Controller delay in microseconds
    pub controller_delay: u32,
    /// Standard codec configuration
    pub codec_config: CodecConfiguration,
    /// Vendor payload, already LTV formatted
    pub vendor_data: Vec<u8, MAX_VENDOR_DATA>,
}

/// True when the handle is inside the valid ISO handle range
#[must_use]
pub const fn iso_handle_valid(iso_handle: u16) -> bool {
    iso_handle <= MAX_ISO_HANDLE
}

/// Build the codec-configuration buffer for a data-path setup command.
///
/// Standard codecs get the four fixed LTV entries with the allocation
/// entry dropped for mono; vendor data is appended verbatim in both cases
/// (for the recognized vendor codecs it is the whole configuration).
#[must_use]
pub fn build_codec_config(
    codec_id: &CodecId,
    config: &CodecConfiguration,
    vendor_data: &[u8],
) -> Vec<u8, MAX_CODEC_CONFIG> {
    let mut buffer = Vec::new();

    if !codec_id.is_recognized_vendor() {
        buffer.push(0x02).ok();
        buffer.push(LTV_TYPE_SAMPLING_FREQUENCY).ok();
        buffer.push(config.sampling_frequency.code()).ok();

        buffer.push(0x02).ok();
        buffer.push(LTV_TYPE_FRAME_DURATION).ok();
        buffer.push(config.frame_duration.code()).ok();

        if config.audio_channel_allocation != AUDIO_LOCATION_MONO {
            buffer.push(0x05).ok();
            buffer.push(LTV_TYPE_CHANNEL_ALLOCATION).ok();
            buffer
                .extend_from_slice(&config.audio_channel_allocation.to_le_bytes())
                .ok();
        }

        buffer.push(0x03).ok();
        buffer.push(LTV_TYPE_OCTETS_PER_FRAME).ok();
        buffer
            .extend_from_slice(&config.octets_per_frame.to_le_bytes())
            .ok();
    }

    buffer.extend_from_slice(vendor_data).ok();
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono_16k_10ms_40() -> CodecConfiguration {
        CodecConfiguration {
            sampling_frequency: SamplingFrequency::Hz16000,
            frame_duration: FrameDuration::Ms10,
            audio_channel_allocation: AUDIO_LOCATION_MONO,
            octets_per_frame: 40,
        }
    }

    #[test]
    fn test_mono_configuration_omits_allocation_entry() {
        let buffer = build_codec_config(&CodecId::lc3(), &mono_16k_10ms_40(), &[]);
        assert_eq!(
            buffer.as_slice(),
            &[
                0x02, 0x01, 0x03, // sampling frequency: 16 kHz
                0x02, 0x02, 0x01, // frame duration: 10 ms
                0x03, 0x04, 0x28, 0x00, // octets per frame: 40
            ]
        );
    }

    #[test]
    fn test_stereo_configuration_includes_allocation_entry() {
        let config = CodecConfiguration {
            audio_channel_allocation: 0x0000_0003,
            ..mono_16k_10ms_40()
        };
        let buffer = build_codec_config(&CodecId::lc3(), &config, &[]);
        assert_eq!(
            buffer.as_slice(),
            &[
                0x02, 0x01, 0x03, //
                0x02, 0x02, 0x01, //
                0x05, 0x03, 0x03, 0x00, 0x00, 0x00, //
                0x03, 0x04, 0x28, 0x00,
            ]
        );
        // six bytes longer than the mono rendition: the full LTV entry
        assert_eq!(buffer.len(), 16);
    }

    #[test]
    fn test_frame_duration_bit() {
        let config = CodecConfiguration {
            frame_duration: FrameDuration::Ms7_5,
            ..mono_16k_10ms_40()
        };
        let buffer = build_codec_config(&CodecId::lc3(), &config, &[]);
        assert_eq!(buffer[5], 0x00);
    }

    #[test]
    fn test_vendor_codec_payload_is_verbatim() {
        let vendor = [0x03, 0xF0, 0xAA, 0xBB];
        let codec_id = CodecId::vendor(CodecId::VS_CODEC_ID_APTX_ADAPTIVE);
        assert!(codec_id.is_recognized_vendor());
        let buffer = build_codec_config(&codec_id, &mono_16k_10ms_40(), &vendor);
        assert_eq!(buffer.as_slice(), &vendor);
    }

    #[test]
    fn test_unrecognized_vendor_gets_standard_entries() {
        let codec_id = CodecId {
            coding_format: CodecId::CODING_FORMAT_VENDOR,
            company_id: 0x1234,
            vendor_codec_id: 0x0001,
        };
        assert!(!codec_id.is_recognized_vendor());
        let buffer = build_codec_config(&codec_id, &mono_16k_10ms_40(), &[]);
        assert_eq!(buffer.len(), 10);
    }

    #[test]
    fn test_iso_handle_bounds() {
        assert!(iso_handle_valid(0x0000));
        assert!(iso_handle_valid(0x0EFF));
        assert!(!iso_handle_valid(0x0F00));
    }

    #[test]
    fn test_codec_id_wire_form() {
        let codec_id = CodecId::vendor(CodecId::VS_CODEC_ID_APTX_LITE);
        assert_eq!(codec_id.to_bytes(), [0xFF, 0x0A, 0x00, 0x02, 0x00]);
        assert_eq!(CodecId::lc3().to_bytes(), [0x06, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_sampling_frequency_mapping() {
        assert_eq!(SamplingFrequency::from_hz(16_000), Some(SamplingFrequency::Hz16000));
        assert_eq!(SamplingFrequency::from_hz(48_000), Some(SamplingFrequency::Hz48000));
        assert_eq!(SamplingFrequency::from_hz(12_345), None);
        assert_eq!(SamplingFrequency::Hz8000.code(), 0x01);
        assert_eq!(SamplingFrequency::Hz384000.code(), 0x0D);
    }
}
