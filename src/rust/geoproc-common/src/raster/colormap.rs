//! カラーマップ（マルチストップ線形補間）

/// RGB色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// カラーストップ: [0, 1] の位置とその色
#[derive(Debug, Clone, Copy)]
pub struct ColorStop {
    pub t: f64,
    pub color: Rgb,
}

impl ColorStop {
    pub const fn new(t: f64, r: u8, g: u8, b: u8) -> Self {
        Self { t, color: Rgb::new(r, g, b) }
    }
}

/// 利用可能なカラースキーム
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorScheme {
    #[default]
    Viridis,
    Grayscale,
    Terrain,
    BlueWhiteRed,
}

impl ColorScheme {
    pub const ALL: &'static [ColorScheme] = &[
        Self::Viridis,
        Self::Grayscale,
        Self::Terrain,
        Self::BlueWhiteRed,
    ];

    /// 名前から解決（大文字小文字、区切り文字は無視）
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "viridis" => Some(Self::Viridis),
            "gray" | "grey" | "grayscale" | "greyscale" => Some(Self::Grayscale),
            "terrain" => Some(Self::Terrain),
            "bluewhitered" | "bwr" => Some(Self::BlueWhiteRed),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Viridis => "viridis",
            Self::Grayscale => "grayscale",
            Self::Terrain => "terrain",
            Self::BlueWhiteRed => "bluewhitered",
        }
    }

    /// 正規化値 `t` ∈ [0, 1] の色
    pub fn evaluate(&self, t: f64) -> Rgb {
        match self {
            Self::Viridis => multi_stop(VIRIDIS_STOPS, t),
            Self::Grayscale => {
                let v = (t.clamp(0.0, 1.0) * 255.0).round() as u8;
                Rgb::new(v, v, v)
            }
            Self::Terrain => multi_stop(TERRAIN_STOPS, t),
            Self::BlueWhiteRed => multi_stop(BLUE_WHITE_RED_STOPS, t),
        }
    }
}

const VIRIDIS_STOPS: &[ColorStop] = &[
    ColorStop::new(0.000, 68, 1, 84),
    ColorStop::new(0.125, 71, 44, 122),
    ColorStop::new(0.250, 59, 81, 139),
    ColorStop::new(0.375, 44, 113, 142),
    ColorStop::new(0.500, 33, 144, 141),
    ColorStop::new(0.625, 39, 173, 129),
    ColorStop::new(0.750, 92, 200, 99),
    ColorStop::new(0.875, 170, 220, 50),
    ColorStop::new(1.000, 253, 231, 37),
];

const TERRAIN_STOPS: &[ColorStop] = &[
    ColorStop::new(0.00, 34, 139, 34),
    ColorStop::new(0.25, 144, 190, 60),
    ColorStop::new(0.50, 220, 200, 80),
    ColorStop::new(0.75, 180, 120, 60),
    ColorStop::new(1.00, 255, 255, 255),
];

const BLUE_WHITE_RED_STOPS: &[ColorStop] = &[
    ColorStop::new(0.00, 33, 102, 172),
    ColorStop::new(0.25, 103, 169, 207),
    ColorStop::new(0.50, 247, 247, 247),
    ColorStop::new(0.75, 239, 138, 98),
    ColorStop::new(1.00, 178, 24, 43),
];

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_color(c1: Rgb, c2: Rgb, t: f64) -> Rgb {
    Rgb::new(
        lerp(c1.r as f64, c2.r as f64, t).round() as u8,
        lerp(c1.g as f64, c2.g as f64, t).round() as u8,
        lerp(c1.b as f64, c2.b as f64, t).round() as u8,
    )
}

fn multi_stop(stops: &[ColorStop], t: f64) -> Rgb {
    let first = stops[0].color;
    let last = stops[stops.len() - 1].color;

    if t.is_nan() || t <= 0.0 {
        return first;
    }
    if t >= 1.0 {
        return last;
    }

    for pair in stops.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if t <= hi.t {
            let ratio = (t - lo.t) / (hi.t - lo.t);
            return lerp_color(lo.color, hi.color, ratio);
        }
    }
    last
}
