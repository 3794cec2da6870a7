use std::{collections::VecDeque, fmt::Write};

use crate::types::{CycleOutcome, Quantity};

pub const HISTORY_CAPACITY: usize = 300;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesLists {
    pub labels: String,
    pub values: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollingBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl RollingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f32) {
        self.samples.push_back(value);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    pub fn first(&self) -> Option<f32> {
        self.samples.front().copied()
    }

    pub fn last(&self) -> Option<f32> {
        self.samples.back().copied()
    }

    pub fn label_value_lists(&self) -> SeriesLists {
        if self.is_empty() {
            return SeriesLists::default();
        }

        let mut lists = SeriesLists {
            labels: String::with_capacity(self.samples.len() * 4),
            values: String::with_capacity(self.samples.len() * 9),
        };

        for (index, value) in self.samples.iter().enumerate() {
            if index != 0 {
                lists.labels.push(',');
                lists.values.push(',');
            }
            // Writing into a String cannot fail.
            let _ = write!(lists.labels, "{index}");
            let _ = write!(lists.values, "{value:.2}");
        }

        lists
    }
}

impl Default for RollingBuffer {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeatherHistory {
    pressure: RollingBuffer,
    temperature: RollingBuffer,
    humidity: RollingBuffer,
}

impl WeatherHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            pressure: RollingBuffer::new(capacity),
            temperature: RollingBuffer::new(capacity),
            humidity: RollingBuffer::new(capacity),
        }
    }

    pub fn series(&self, quantity: Quantity) -> &RollingBuffer {
        match quantity {
            Quantity::Pressure => &self.pressure,
            Quantity::Temperature => &self.temperature,
            Quantity::Humidity => &self.humidity,
        }
    }

    pub fn push(&mut self, quantity: Quantity, value: f32) {
        match quantity {
            Quantity::Pressure => self.pressure.push(value),
            Quantity::Temperature => self.temperature.push(value),
            Quantity::Humidity => self.humidity.push(value),
        }
    }

    // A failed read leaves the buffers it would have fed untouched.
    pub fn record(&mut self, outcome: &CycleOutcome) {
        if let Ok(pressure_pa) = &outcome.pressure_pa {
            self.pressure.push(*pressure_pa);
        }
        if let Ok(climate) = &outcome.climate {
            self.temperature.push(climate.temperature_c);
            self.humidity.push(climate.humidity_pct);
        }
    }

    pub fn snapshot(&self) -> WeatherHistory {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{sensor::SensorError, types::ClimateReading};

    #[test]
    fn keeps_last_values_in_order() {
        for count in [0_usize, 1, 299, 300, 301, 750] {
            let mut buffer = RollingBuffer::default();
            for i in 0..count {
                buffer.push(i as f32);
            }

            let kept = count.min(HISTORY_CAPACITY);
            assert_eq!(buffer.len(), kept);
            let expected: Vec<f32> = (count - kept..count).map(|i| i as f32).collect();
            assert_eq!(buffer.iter().collect::<Vec<_>>(), expected);
        }
    }

    #[test]
    fn overflow_evicts_oldest_temperature() {
        let mut buffer = RollingBuffer::default();
        for i in 0..=300 {
            buffer.push(i as f32);
        }

        assert_eq!(buffer.len(), 300);
        assert_eq!(buffer.first(), Some(1.0));
        assert_eq!(buffer.last(), Some(300.0));
    }

    #[test]
    fn zero_capacity_holds_one_sample() {
        let mut buffer = RollingBuffer::new(0);
        buffer.push(1.0);
        buffer.push(2.0);

        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.iter().collect::<Vec<_>>(), vec![2.0]);
    }

    #[test]
    fn formats_pressure_lists() {
        let mut buffer = RollingBuffer::default();
        buffer.push(1010.0);
        buffer.push(1010.5);

        let lists = buffer.label_value_lists();
        assert_eq!(lists.labels, "0,1");
        assert_eq!(lists.values, "1010.00,1010.50");
    }

    #[test]
    fn empty_buffer_yields_empty_lists() {
        assert_eq!(RollingBuffer::default().label_value_lists(), SeriesLists::default());
    }

    #[test]
    fn list_lengths_match_buffer() {
        let mut buffer = RollingBuffer::new(5);
        for value in [-3.25, 0.0, 12.126, 99.999, 7.5, 8.0, 1e5] {
            buffer.push(value);
        }

        let lists = buffer.label_value_lists();
        assert_eq!(lists.labels.split(',').count(), buffer.len());
        assert_eq!(lists.values.split(',').count(), buffer.len());
        assert_eq!(lists.labels, "0,1,2,3,4");
        assert_eq!(lists.values, "12.13,100.00,7.50,8.00,100000.00");
    }

    #[test]
    fn failed_climate_read_is_not_recorded() {
        let mut history = WeatherHistory::default();
        history.record(&CycleOutcome {
            pressure_pa: Ok(101_325.0),
            climate: Err(SensorError::NotReady { sensor: "SHT4x" }),
        });
        history.record(&CycleOutcome {
            pressure_pa: Err(SensorError::NotReady { sensor: "BMP280" }),
            climate: Ok(ClimateReading {
                temperature_c: 21.5,
                humidity_pct: 40.0,
            }),
        });

        assert_eq!(history.series(Quantity::Pressure).len(), 1);
        assert_eq!(history.series(Quantity::Temperature).len(), 1);
        assert_eq!(history.series(Quantity::Humidity).len(), 1);
        assert_eq!(history.series(Quantity::Temperature).last(), Some(21.5));
    }

    #[test]
    fn snapshot_is_detached() {
        let mut history = WeatherHistory::new(3);
        history.push(Quantity::Humidity, 55.0);
        let snapshot = history.snapshot();
        history.push(Quantity::Humidity, 56.0);

        assert_eq!(snapshot.series(Quantity::Humidity).len(), 1);
        assert_eq!(history.series(Quantity::Humidity).len(), 2);
    }
}
