//! Property schema a host can turn into a settings UI.

use serde::Serialize;

use crate::config::{FilterConfig, BLUR_RADIUS_RANGE, EDGE_SMOOTHING_RANGE, UNIT_RANGE};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyKind {
    Bool { default: bool },
    Int { min: u32, max: u32, step: u32, default: u32 },
    Float { min: f32, max: f32, step: f32, default: f32 },
    List { options: Vec<ListOption>, default: &'static str },
    Color { default: u32 },
    Path { filter: &'static str },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListOption {
    pub label: &'static str,
    pub value: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub key: &'static str,
    pub label: &'static str,
    #[serde(flatten)]
    pub kind: PropertyKind,
}

fn option(label: &'static str, value: &'static str) -> ListOption {
    ListOption { label, value }
}

fn property(key: &'static str, label: &'static str, kind: PropertyKind) -> Property {
    Property { key, label, kind }
}

/// One entry per recognised setting key, defaults taken from [`FilterConfig::default`].
pub fn describe_properties() -> Vec<Property> {
    let d = FilterConfig::default();
    vec![
        property("enabled", "Enabled", PropertyKind::Bool { default: d.enabled }),
        property(
            "quality",
            "Quality",
            PropertyKind::List {
                options: vec![
                    option("Fast (~60 fps)", "fast"),
                    option("Balanced (~30 fps)", "balanced"),
                    option("Accurate (~15 fps)", "accurate"),
                ],
                default: "balanced",
            },
        ),
        property(
            "background_mode",
            "Background",
            PropertyKind::List {
                options: vec![
                    option("Blur", "blur"),
                    option("Solid color", "color"),
                    option("Transparent", "transparent"),
                    option("Image", "image"),
                ],
                default: "blur",
            },
        ),
        property(
            "blur_radius",
            "Blur radius",
            PropertyKind::Int {
                min: BLUR_RADIUS_RANGE.0,
                max: BLUR_RADIUS_RANGE.1,
                step: 1,
                default: d.blur_radius,
            },
        ),
        property(
            "edge_smoothing",
            "Edge smoothing",
            PropertyKind::Float {
                min: EDGE_SMOOTHING_RANGE.0,
                max: EDGE_SMOOTHING_RANGE.1,
                step: 0.1,
                default: d.edge_smoothing,
            },
        ),
        property(
            "mask_threshold",
            "Mask threshold",
            PropertyKind::Float {
                min: UNIT_RANGE.0,
                max: UNIT_RANGE.1,
                step: 0.01,
                default: d.mask_threshold,
            },
        ),
        property("temporal_smoothing", "Temporal smoothing", PropertyKind::Bool { default: d.temporal_smoothing }),
        property(
            "temporal_factor",
            "Temporal factor",
            PropertyKind::Float {
                min: UNIT_RANGE.0,
                max: UNIT_RANGE.1,
                step: 0.05,
                default: d.temporal_factor,
            },
        ),
        property("edge_refinement", "Edge refinement", PropertyKind::Bool { default: d.edge_refinement }),
        property("background_color", "Background color", PropertyKind::Color { default: d.background_color }),
        property(
            "background_image",
            "Background image",
            PropertyKind::Path {
                filter: "Images (*.png *.jpg *.jpeg *.bmp)",
            },
        ),
        property("show_mask", "Show mask", PropertyKind::Bool { default: d.show_mask }),
        property("performance_info", "Log performance", PropertyKind::Bool { default: d.performance_info }),
    ]
}
