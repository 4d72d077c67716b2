/*
 *  display/framebuffer.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  Runtime-sized RGB565 canvas the renderer draws into
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

use core::convert::Infallible;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

/// A runtime-sized framebuffer for embedded-graphics.
#[derive(Debug, Clone)]
pub struct Canvas {
    buf: Vec<Rgb565>,
    w: usize,
    h: usize,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let (w, h) = (width as usize, height as usize);
        Self { buf: vec![Rgb565::BLACK; w * h], w, h }
    }

    pub fn width(&self) -> u32 { self.w as u32 }
    pub fn height(&self) -> u32 { self.h as u32 }

    /// Row-major pixels, ready for `DisplayDriver::draw_bitmap`
    pub fn as_slice(&self) -> &[Rgb565] { &self.buf }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb565> {
        self.idx(Point::new(x as i32, y as i32)).map(|i| self.buf[i])
    }

    /// Clear to black
    pub fn blank(&mut self) {
        self.buf.fill(Rgb565::BLACK);
    }

    /// Count of pixels that are not black inside `area`
    pub fn lit_in(&self, area: &Rectangle) -> usize {
        area.points()
            .filter_map(|p| self.idx(p))
            .filter(|&i| self.buf[i] != Rgb565::BLACK)
            .count()
    }

    /// Map (x,y) to linear index; returns None if out of bounds
    #[inline]
    fn idx(&self, p: Point) -> Option<usize> {
        if p.x >= 0 && p.y >= 0 {
            let (x, y) = (p.x as usize, p.y as usize);
            if x < self.w && y < self.h {
                return Some(y * self.w + x);
            }
        }
        None
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.w as u32, self.h as u32)
    }
}

impl DrawTarget for Canvas {
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, c) in pixels {
            if let Some(i) = self.idx(p) {
                self.buf[i] = c;
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        // rows clipped to the canvas, then filled in one go
        let area = area.intersection(&self.bounding_box());
        let Some(bottom_right) = area.bottom_right() else {
            return Ok(());
        };
        let (x0, x1) = (area.top_left.x as usize, bottom_right.x as usize);
        for y in area.top_left.y as usize..=bottom_right.y as usize {
            let base = y * self.w;
            self.buf[base + x0..=base + x1].fill(color);
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.buf.fill(color);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::primitives::{Line, PrimitiveStyle};

    #[test]
    fn test_out_of_bounds_pixels_ignored() {
        let mut c = Canvas::new(8, 4);
        Line::new(Point::new(-5, 1), Point::new(20, 1))
            .into_styled(PrimitiveStyle::with_stroke(Rgb565::RED, 1))
            .draw(&mut c)
            .unwrap();
        assert_eq!(c.lit_in(&c.bounding_box()), 8);
        assert_eq!(c.pixel(0, 1), Some(Rgb565::RED));
        assert_eq!(c.pixel(8, 1), None);
    }

    #[test]
    fn test_fill_solid_clips() {
        let mut c = Canvas::new(10, 10);
        c.fill_solid(&Rectangle::new(Point::new(8, 8), Size::new(5, 5)), Rgb565::GREEN).unwrap();
        assert_eq!(c.lit_in(&c.bounding_box()), 4);
        c.fill_solid(&Rectangle::new(Point::new(20, 20), Size::new(5, 5)), Rgb565::GREEN).unwrap();
        assert_eq!(c.lit_in(&c.bounding_box()), 4);
        c.blank();
        assert_eq!(c.lit_in(&c.bounding_box()), 0);
    }
}
