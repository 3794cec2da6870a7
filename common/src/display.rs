use embedded_graphics::{
    mono_font::{
        ascii::{FONT_10X20, FONT_6X10},
        MonoFont, MonoTextStyle,
    },
    pixelcolor::Rgb565,
    prelude::*,
    text::{Baseline, Text},
};

use crate::types::CycleOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSize {
    Small,
    Large,
}

impl TextSize {
    pub fn font(self) -> &'static MonoFont<'static> {
        match self {
            TextSize::Small => &FONT_6X10,
            TextSize::Large => &FONT_10X20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine {
    pub text: String,
    pub size: TextSize,
}

impl DisplayLine {
    pub fn small(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            size: TextSize::Small,
        }
    }

    pub fn large(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            size: TextSize::Large,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayFrame {
    pub lines: Vec<DisplayLine>,
}

impl DisplayFrame {
    pub fn message<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(DisplayLine::large).collect(),
        }
    }

    pub fn for_cycle(address: &str, outcome: &CycleOutcome) -> Self {
        let mut lines = vec![DisplayLine::small(address)];

        match (&outcome.pressure_pa, &outcome.climate) {
            (Ok(pressure_pa), Ok(climate)) => {
                lines.push(DisplayLine::large(format!(
                    "Pressure: {:.0} hPa",
                    pressure_pa / 100.0
                )));
                lines.push(DisplayLine::large(format!(
                    "Temp: {:.1} C",
                    climate.temperature_c
                )));
                lines.push(DisplayLine::large(format!(
                    "Humidity: {:.1} %",
                    climate.humidity_pct
                )));
            }
            _ => {
                for err in outcome.errors() {
                    lines.push(DisplayLine::large(format!("{} Error:", err.sensor())));
                    lines.push(DisplayLine::small(err.to_string()));
                }
            }
        }

        Self { lines }
    }

    pub fn text(&self) -> Vec<&str> {
        self.lines.iter().map(|line| line.text.as_str()).collect()
    }
}

pub fn draw_frame<D>(target: &mut D, frame: &DisplayFrame) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    target.clear(Rgb565::BLACK)?;

    let width = target.bounding_box().size.width;
    let mut y = 0_i32;

    for line in &frame.lines {
        let font = line.size.font();
        let style = MonoTextStyle::new(font, Rgb565::WHITE);
        let columns = (width / font.character_size.width).max(1) as usize;

        for chunk in wrap(&line.text, columns) {
            Text::with_baseline(&chunk, Point::new(0, y), style, Baseline::Top).draw(target)?;
            y += font.character_size.height as i32 + 2;
        }
    }

    Ok(())
}

fn wrap(text: &str, columns: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(columns)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
