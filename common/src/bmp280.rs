use core::fmt::Debug;

use bme280::{i2c::BME280, Configuration, IIRFilter, Oversampling};
use embedded_hal::{delay::DelayNs, i2c::I2c};

use crate::sensor::{finite, PressureSensor, SensorError};

pub const DEFAULT_ADDRESS: u8 = 0x76;

const SENSOR: &str = "BMP280";

pub struct Bmp280<I, D> {
    sensor: BME280<I>,
    delay: D,
}

impl<I: I2c, D: DelayNs> Bmp280<I, D> {
    pub fn new(i2c: I, address: u8, mut delay: D) -> Result<Self, SensorError> {
        let mut sensor = BME280::new(i2c, address);
        sensor
            .init_with_config(&mut delay, sampling())
            .map_err(driver_error)?;
        Ok(Self { sensor, delay })
    }

    // (temperature °C, pressure Pa)
    pub fn measure(&mut self) -> Result<(f32, f32), SensorError> {
        let measurements = self.sensor.measure(&mut self.delay).map_err(driver_error)?;
        Ok((
            finite(SENSOR, measurements.temperature)?,
            finite(SENSOR, measurements.pressure)?,
        ))
    }
}

impl<I: I2c, D: DelayNs> PressureSensor for Bmp280<I, D> {
    fn read_pressure_pa(&mut self) -> Result<f32, SensorError> {
        self.measure().map(|(_, pressure_pa)| pressure_pa)
    }
}

// Weather monitoring profile: x2 temperature, x16 pressure, IIR 16.
fn sampling() -> Configuration {
    Configuration::default()
        .with_temperature_oversampling(Oversampling::Oversampling2X)
        .with_pressure_oversampling(Oversampling::Oversampling16X)
        .with_iir_filter(IIRFilter::Coefficient16)
}

fn driver_error<E: Debug>(err: bme280::Error<E>) -> SensorError {
    match err {
        bme280::Error::Bus(err) => SensorError::Bus {
            sensor: SENSOR,
            details: format!("{err:?}"),
        },
        bme280::Error::UnsupportedChip => SensorError::UnknownDevice { sensor: SENSOR },
        other => SensorError::Device {
            sensor: SENSOR,
            details: format!("{other:?}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};

    use super::*;

    const REG_CHIP_ID: usize = 0xD0;
    const BMP280_CHIP_ID: u8 = 0x58;

    // Datasheet worked example: T1..T3, P1..P9 and the raw readings that
    // compensate to 25.08 °C and 100 653 Pa.
    const CALIBRATION: [i32; 12] = [
        27_504, 26_435, -1_000, 36_477, -10_685, 3_024, 2_855, 140, -7, 15_500, -14_600, 6_000,
    ];
    const ADC_T: u32 = 519_888;
    const ADC_P: u32 = 415_148;

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    // Register file behind an auto-incrementing pointer, like the chip.
    struct FakeBus {
        registers: [u8; 256],
        pointer: u8,
        fail: bool,
    }

    impl FakeBus {
        fn new() -> Self {
            let mut registers = [0_u8; 256];
            registers[REG_CHIP_ID] = BMP280_CHIP_ID;
            for (i, word) in CALIBRATION.iter().enumerate() {
                let bytes = (*word as u16).to_le_bytes();
                registers[0x88 + i * 2] = bytes[0];
                registers[0x88 + i * 2 + 1] = bytes[1];
            }
            registers[0xF7..0xFA].copy_from_slice(&raw20(ADC_P));
            registers[0xFA..0xFD].copy_from_slice(&raw20(ADC_T));
            Self {
                registers,
                pointer: 0,
                fail: false,
            }
        }
    }

    fn raw20(value: u32) -> [u8; 3] {
        [(value >> 12) as u8, (value >> 4) as u8, ((value & 0x0f) << 4) as u8]
    }

    impl ErrorType for FakeBus {
        type Error = ErrorKind;
    }

    impl I2c for FakeBus {
        fn transaction(
            &mut self,
            _address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if self.fail {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            for operation in operations {
                match operation {
                    Operation::Write(bytes) => {
                        if let Some((&register, values)) = bytes.split_first() {
                            self.pointer = register;
                            // Keep the chip id and data registers as seeded.
                            if register < 0xD0 || (0xE0..0xF7).contains(&register) {
                                for (offset, value) in values.iter().enumerate() {
                                    self.registers[usize::from(register) + offset] = *value;
                                }
                            }
                        }
                    }
                    Operation::Read(buffer) => {
                        for byte in buffer.iter_mut() {
                            *byte = self.registers[usize::from(self.pointer)];
                            self.pointer = self.pointer.wrapping_add(1);
                        }
                    }
                }
            }
            Ok(())
        }
    }

    #[test]
    fn measures_datasheet_example() {
        let mut sensor = Bmp280::new(FakeBus::new(), DEFAULT_ADDRESS, NoDelay).unwrap();

        let (temperature, pressure) = sensor.measure().unwrap();
        assert!((temperature - 25.08).abs() < 0.01, "temperature {temperature}");
        assert!((pressure - 100_653.0).abs() < 2.0, "pressure {pressure}");

        let reading = sensor.read_pressure_pa().unwrap();
        assert!((reading - 100_653.0).abs() < 2.0);
    }

    #[test]
    fn rejects_other_chips() {
        let mut bus = FakeBus::new();
        bus.registers[REG_CHIP_ID] = 0x55;

        let err = Bmp280::new(bus, DEFAULT_ADDRESS, NoDelay).err().unwrap();
        assert_eq!(err, SensorError::UnknownDevice { sensor: "BMP280" });
    }

    #[test]
    fn bus_failure_maps_to_sensor_error() {
        let mut bus = FakeBus::new();
        bus.fail = true;

        let err = Bmp280::new(bus, DEFAULT_ADDRESS, NoDelay).err().unwrap();
        assert!(matches!(err, SensorError::Bus { sensor: "BMP280", .. }));
        assert!(err.to_string().starts_with("BMP280: bus error"));
    }

    #[test]
    fn driver_faults_keep_their_description() {
        let err = driver_error::<ErrorKind>(bme280::Error::CompensationFailed);
        assert_eq!(
            err,
            SensorError::Device {
                sensor: "BMP280",
                details: "CompensationFailed".to_string()
            }
        );
    }
}
