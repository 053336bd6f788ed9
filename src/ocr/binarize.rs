use image::{GrayImage, Luma};

/// Otsu's global threshold over the 256-bin luma histogram.
///
/// Returns the level maximizing between-class variance. Uniform images
/// return their single level.
pub fn otsu_threshold(image: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0;
    }

    let weighted_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(level, &count)| level as f64 * count as f64)
        .sum();

    let mut background_weight = 0u64;
    let mut background_sum = 0f64;
    let mut best_level = 0u8;
    let mut best_variance = -1f64;

    for (level, &count) in histogram.iter().enumerate() {
        background_weight += count;
        if background_weight == 0 {
            continue;
        }
        let foreground_weight = total - background_weight;
        if foreground_weight == 0 {
            if best_variance < 0.0 {
                best_level = level as u8;
            }
            break;
        }
        background_sum += level as f64 * count as f64;
        let mean_background = background_sum / background_weight as f64;
        let mean_foreground = (weighted_total - background_sum) / foreground_weight as f64;
        let diff = mean_background - mean_foreground;
        let variance = background_weight as f64 * foreground_weight as f64 * diff * diff;
        if variance > best_variance {
            best_variance = variance;
            best_level = level as u8;
        }
    }
    best_level
}

/// Binary threshold: pixels above `level` become 255, the rest 0.
pub fn binarize(image: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y)[0] > level {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otsu_splits_a_bimodal_image() {
        let image = GrayImage::from_fn(20, 10, |x, _| if x < 10 { Luma([30]) } else { Luma([220]) });
        let level = otsu_threshold(&image);
        assert!((30..220).contains(&level), "level {}", level);

        let binary = binarize(&image, level);
        assert_eq!(binary.get_pixel(0, 0)[0], 0);
        assert_eq!(binary.get_pixel(19, 9)[0], 255);
    }

    #[test]
    fn uniform_image_thresholds_at_its_level() {
        let image = GrayImage::from_pixel(4, 4, Luma([128]));
        assert_eq!(otsu_threshold(&image), 128);
        assert!(binarize(&image, 128).pixels().all(|p| p[0] == 0));
    }
}
