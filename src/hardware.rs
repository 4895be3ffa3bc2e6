//! Raspberry Pi adapters: MCP3208 ADC over SPI and GPIO display lines (rppal).

use crate::config::HardwareConfig;
use crate::display::{DisplayError, SegmentPin, SevenSegmentDisplay};
use crate::sampler::{SampleSource, SourceError};
use crate::Channel;
use rppal::gpio::{Gpio, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

/// 12-bit, 8-channel SPI ADC on SPI0 CE0.
pub struct Mcp3208Source {
    spi: Spi,
    adc_channels: [u8; 2],
}

impl Mcp3208Source {
    pub fn open(config: &HardwareConfig) -> Result<Self, SourceError> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, config.spi_clock_hz, Mode::Mode0)
            .map_err(|e| SourceError::Read(e.to_string()))?;
        log::info!(
            "[Hardware] MCP3208 on SPI0 at {} Hz, channels {} / {}",
            config.spi_clock_hz,
            config.first_adc_channel,
            config.second_adc_channel
        );
        Ok(Self {
            spi,
            adc_channels: [config.first_adc_channel, config.second_adc_channel],
        })
    }
}

impl SampleSource for Mcp3208Source {
    fn read(&mut self, channel: Channel) -> Result<u16, SourceError> {
        let adc = self.adc_channels[channel.index()];
        // start bit, single-ended, D2 | D1 D0 | don't care
        let tx = [0x06 | ((adc & 0x04) >> 2), (adc & 0x03) << 6, 0x00];
        let mut rx = [0u8; 3];
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| SourceError::Read(e.to_string()))?;
        Ok((u16::from(rx[1] & 0x0F) << 8) | u16::from(rx[2]))
    }
}

pub struct GpioSegmentPin {
    pin: OutputPin,
}

impl SegmentPin for GpioSegmentPin {
    fn set_level(&mut self, high: bool) -> Result<(), DisplayError> {
        if high {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }
}

fn output_pin(gpio: &Gpio, bcm: u8) -> Result<GpioSegmentPin, DisplayError> {
    let pin = gpio
        .get(bcm)
        .map_err(|e| DisplayError(format!("GPIO {bcm}: {e}")))?
        .into_output();
    Ok(GpioSegmentPin { pin })
}

/// Claim the configured digit and segment lines.
pub fn open_display(
    config: &HardwareConfig,
) -> Result<SevenSegmentDisplay<GpioSegmentPin>, DisplayError> {
    let gpio = Gpio::new().map_err(|e| DisplayError(e.to_string()))?;

    let mut digit_pins = Vec::with_capacity(4);
    for &bcm in &config.digit_pins {
        digit_pins.push(output_pin(&gpio, bcm)?);
    }
    let mut segment_pins = Vec::with_capacity(8);
    for &bcm in &config.segment_pins {
        segment_pins.push(output_pin(&gpio, bcm)?);
    }

    log::info!(
        "[Hardware] Display digits on GPIO {:?}, segments on GPIO {:?}",
        config.digit_pins,
        config.segment_pins
    );
    SevenSegmentDisplay::new(
        digit_pins
            .try_into()
            .map_err(|_| DisplayError("expected 4 digit pins".into()))?,
        segment_pins
            .try_into()
            .map_err(|_| DisplayError("expected 8 segment pins".into()))?,
    )
}
