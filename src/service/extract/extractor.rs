use image::{imageops::FilterType, DynamicImage, GenericImageView};
use kmeans_colors::get_kmeans;
use palette::{IntoColor, Lab, Srgb};
use std::collections::{HashMap, HashSet};
use crate::error::AppResult;

/// 从解码后的图片里提取 `count` 个主色，按占比从高到低排列
#[cfg_attr(test, mockall::automock)]
pub trait ColorExtractor: Send + Sync {
    fn extract(&self, image: &DynamicImage, count: usize) -> AppResult<Vec<String>>;
}

pub fn decode(bytes: &[u8]) -> AppResult<DynamicImage> {
    Ok(image::load_from_memory(bytes)?)
}

/// Lab 空间上的 k-means 聚类
#[derive(Debug, Clone)]
pub struct KmeansExtractor {
    /// 长边超过这个尺寸先缩小，不裁剪
    pub resize_to: u32,
    pub max_iter: usize,
    pub converge: f32,
    pub seed: u64,
}

impl Default for KmeansExtractor {
    fn default() -> Self {
        Self {
            resize_to: 80,
            max_iter: 20,
            converge: 1e-4,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Cluster {
    sum: [u64; 3],
    count: u64,
}

impl Cluster {
    fn add(&mut self, rgb: [u8; 3], n: u64) {
        for (s, c) in self.sum.iter_mut().zip(rgb) {
            *s += c as u64 * n;
        }
        self.count += n;
    }

    fn hex(&self) -> String {
        let avg = |s: u64| ((s + self.count / 2) / self.count) as u8;
        format!("#{:02x}{:02x}{:02x}", avg(self.sum[0]), avg(self.sum[1]), avg(self.sum[2]))
    }
}

impl KmeansExtractor {
    fn downscale(&self, image: &DynamicImage) -> DynamicImage {
        let (w, h) = image.dimensions();
        let max_side = w.max(h);
        if max_side <= self.resize_to {
            return image.clone();
        }
        let ratio = self.resize_to as f32 / max_side as f32;
        let nw = ((w as f32) * ratio).round().max(1.0) as u32;
        let nh = ((h as f32) * ratio).round().max(1.0) as u32;
        // 最近邻不会混出原图没有的颜色
        image.resize_exact(nw, nh, FilterType::Nearest)
    }
}

impl ColorExtractor for KmeansExtractor {
    fn extract(&self, image: &DynamicImage, count: usize) -> AppResult<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let working = self.downscale(image);
        let pixels: Vec<[u8; 3]> = working
            .to_rgba8()
            .pixels()
            .filter(|p| p[3] != 0)
            .map(|p| [p[0], p[1], p[2]])
            .collect();

        if pixels.is_empty() {
            return Ok(Vec::new());
        }

        let mut histogram: HashMap<[u8; 3], u64> = HashMap::new();
        for p in &pixels {
            *histogram.entry(*p).or_default() += 1;
        }

        let clusters: Vec<Cluster> = if histogram.len() <= count {
            // 颜色种类不多于 count，不需要聚类
            histogram
                .into_iter()
                .map(|(rgb, n)| {
                    let mut cluster = Cluster::default();
                    cluster.add(rgb, n);
                    cluster
                })
                .collect()
        } else {
            let lab_pixels: Vec<Lab> = pixels
                .iter()
                .map(|p| Srgb::<u8>::new(p[0], p[1], p[2]).into_linear().into_color())
                .collect();
            let result = get_kmeans(count, self.max_iter, self.converge, false, &lab_pixels, self.seed);

            let mut clusters = vec![Cluster::default(); result.centroids.len()];
            for (p, &idx) in pixels.iter().zip(result.indices.iter()) {
                clusters[idx as usize].add(*p, 1);
            }
            clusters
        };

        let mut ranked: Vec<(u64, String)> = clusters
            .iter()
            .filter(|c| c.count > 0)
            .map(|c| (c.count, c.hex()))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let mut seen = HashSet::new();
        let mut colors: Vec<String> = ranked
            .into_iter()
            .filter_map(|(_, hex)| seen.insert(hex.clone()).then_some(hex))
            .collect();
        colors.truncate(count);

        Ok(colors)
    }
}
