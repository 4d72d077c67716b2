/*
 *  providers/test_pattern.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use async_trait::async_trait;
use embedded_graphics::pixelcolor::Rgb565;

use crate::providers::Provider;
use crate::render::{RenderMessage, palette};
use crate::sign::SignMode;

/// Colour steps shown in turn, one per poll.
const STEPS: [(&str, Rgb565); 5] = [
    ("RED", palette::RED),
    ("GREEN", palette::GREEN),
    ("BLUE", palette::BLUE),
    ("WHITE", palette::WHITE),
    ("AMBER", palette::AMBER),
];

/// Fixed calibration content: a label in each primary colour.
#[derive(Debug, Default)]
pub struct TestPatternProvider {
    step: usize,
    banner: String,
}

impl TestPatternProvider {
    pub fn new(banner: impl Into<String>) -> Self {
        Self {
            step: 0,
            banner: banner.into(),
        }
    }
}

#[async_trait]
impl Provider for TestPatternProvider {
    fn mode(&self) -> SignMode {
        SignMode::Test
    }

    fn name(&self) -> &'static str {
        "test"
    }

    async fn poll(&mut self) -> RenderMessage {
        let (label, color) = STEPS[self.step % STEPS.len()];
        self.step = self.step.wrapping_add(1);
        let text = if self.banner.is_empty() {
            label.to_string()
        } else {
            format!("{} {}", self.banner, label)
        };
        RenderMessage::text(SignMode::Test, text, color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderContent;

    #[tokio::test]
    async fn test_cycles_colours() {
        let mut p = TestPatternProvider::new("lmsign");
        let mut colours = Vec::new();
        for _ in 0..STEPS.len() + 1 {
            match p.poll().await.content {
                RenderContent::Text(t) => colours.push(t.color),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(colours[0], palette::RED);
        assert_eq!(colours[STEPS.len()], palette::RED);
        assert_eq!(colours[2], palette::BLUE);
    }
}
