// THEORY (single-pixel heuristics):
// `Pixel` is the smallest unit the analysis layer reasons about. It is a "dumb"
// container for one RGB sample plus the heuristics that can be computed from that
// sample alone: no neighbors, no history. Anything comparing pixels over time lives
// in `background_model`; anything aggregating pixels over a frame lives in
// `motion_gate` or `fire_detector`.
//
// Color strength and hue follow the hexcone HSV model:
// - value_hsv:      max(R, G, B)
// - chroma:         max - min
// - saturation_hsv: chroma / value (0 for black)
// - hue:            angle on the color wheel in degrees [0, 360)
//
// `hsv8` packs those into the 8-bit scale common to camera tooling: hue halved to
// [0, 180], saturation and value stretched to [0, 255]. Color-band thresholds
// (e.g. "hue 0..10, saturation >= 50") are written against that scale.

pub type Channel = u8;
pub type NormalizedChannel = f32;
pub type Hue = f32;
pub type SaturationHSV = f32;
pub type ValueHSV = f32;
pub type Chroma = f32;

/// Hue, saturation and value in the 8-bit scale (H in 0..=180, S and V in 0..=255).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsv8 {
    pub hue: u8,
    pub saturation: u8,
    pub value: u8,
}

/// A single RGB sample with cached normalized channels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pixel {
    /// The red channel value (0-255).
    pub red: Channel,
    /// The green channel value (0-255).
    pub green: Channel,
    /// The blue channel value (0-255).
    pub blue: Channel,
    /// The red channel value (0.0-1.0).
    pub red_normalized: NormalizedChannel,
    /// The green channel value (0.0-1.0).
    pub green_normalized: NormalizedChannel,
    /// The blue channel value (0.0-1.0).
    pub blue_normalized: NormalizedChannel,
}

impl Pixel {
    pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
        Pixel {
            red,
            green,
            blue,
            red_normalized: red as NormalizedChannel / 255.0f32,
            green_normalized: green as NormalizedChannel / 255.0f32,
            blue_normalized: blue as NormalizedChannel / 255.0f32,
        }
    }

    /// HSV value: the brightest channel (0.0-1.0).
    pub fn value_hsv(&self) -> ValueHSV {
        self.red_normalized
            .max(self.green_normalized.max(self.blue_normalized))
    }

    /// Spread between the strongest and weakest channel (0.0-1.0).
    pub fn chroma(&self) -> Chroma {
        let minimum_channel = self
            .red_normalized
            .min(self.green_normalized.min(self.blue_normalized));
        self.value_hsv() - minimum_channel
    }

    /// HSV saturation (0.0-1.0); black is fully unsaturated.
    pub fn saturation_hsv(&self) -> SaturationHSV {
        let value = self.value_hsv();
        if value <= 1e-6 {
            return 0.0;
        }
        self.chroma() / value
    }

    /// Hue angle in degrees [0, 360). Achromatic pixels report 0.
    pub fn hue(&self) -> Hue {
        let maximum_channel = self.value_hsv();
        let chroma = self.chroma();

        if chroma <= 1e-6 {
            return 0.0;
        }

        let inverse_chroma = 1.0 / chroma;

        let (base_difference, sector_offset) = if maximum_channel == self.red_normalized {
            (self.green_normalized - self.blue_normalized, 0.0)
        } else if maximum_channel == self.green_normalized {
            (self.blue_normalized - self.red_normalized, 2.0)
        } else {
            (self.red_normalized - self.green_normalized, 4.0)
        };

        let mut hue_degrees = (base_difference * inverse_chroma + sector_offset) * 60.0;
        if hue_degrees < 0.0 {
            hue_degrees += 360.0;
        }
        hue_degrees
    }

    /// HSV in the 8-bit scale used by color-band thresholds.
    pub fn hsv8(&self) -> Hsv8 {
        Hsv8 {
            hue: (self.hue() / 2.0).round().clamp(0.0, 180.0) as u8,
            saturation: (self.saturation_hsv() * 255.0).round().clamp(0.0, 255.0) as u8,
            value: (self.value_hsv() * 255.0).round().clamp(0.0, 255.0) as u8,
        }
    }
}

impl From<image::Rgb<u8>> for Pixel {
    fn from(rgb: image::Rgb<u8>) -> Self {
        let [red, green, blue] = rgb.0;
        Pixel::new(red, green, blue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_colors_map_to_expected_hues() {
        assert_eq!(Pixel::new(255, 0, 0).hsv8().hue, 0);
        assert_eq!(Pixel::new(0, 255, 0).hsv8().hue, 60);
        assert_eq!(Pixel::new(0, 0, 255).hsv8().hue, 120);
    }

    #[test]
    fn orange_falls_in_the_low_hue_band() {
        let hsv = Pixel::new(255, 60, 0).hsv8();
        assert!(hsv.hue <= 10, "hue was {}", hsv.hue);
        assert_eq!(hsv.saturation, 255);
        assert_eq!(hsv.value, 255);
    }

    #[test]
    fn magenta_red_wraps_to_the_high_hue_band() {
        let hsv = Pixel::new(255, 0, 40).hsv8();
        assert!(hsv.hue >= 170, "hue was {}", hsv.hue);
    }

    #[test]
    fn grey_and_black_are_unsaturated() {
        let grey = Pixel::new(128, 128, 128).hsv8();
        assert_eq!(grey.saturation, 0);
        assert_eq!(grey.hue, 0);
        assert_eq!(grey.value, 128);
        assert_eq!(Pixel::new(0, 0, 0).hsv8(), Hsv8 { hue: 0, saturation: 0, value: 0 });
    }
}
