//! Built-in copybook templates.
//!
//! Deployments typically ship a handful of standard practice sheets; these
//! cover the common layouts. Custom templates can be added by extending the
//! seed list at startup.

use inkstone_types::dto::{CopybookTemplate, GridType};

/// The standard template set seeded into every store.
pub fn builtin_templates() -> Vec<CopybookTemplate> {
    vec![
        CopybookTemplate {
            id: 1,
            name: "田字格 10x8".into(),
            grid_type: GridType::Tian,
            grid_rows: 10,
            grid_cols: 8,
            header_ratio: 0.0,
            description: "标准田字格练习纸".into(),
        },
        CopybookTemplate {
            id: 2,
            name: "田字格 12x9（带标题栏）".into(),
            grid_type: GridType::Tian,
            grid_rows: 12,
            grid_cols: 9,
            header_ratio: 0.08,
            description: "顶部含姓名日期栏".into(),
        },
        CopybookTemplate {
            id: 3,
            name: "米字格 8x6".into(),
            grid_type: GridType::Mi,
            grid_rows: 8,
            grid_cols: 6,
            header_ratio: 0.0,
            description: "米字格，适合楷书临摹".into(),
        },
        CopybookTemplate {
            id: 4,
            name: "回宫格 6x5".into(),
            grid_type: GridType::Hui,
            grid_rows: 6,
            grid_cols: 5,
            header_ratio: 0.05,
            description: "回宫格，重心训练".into(),
        },
        CopybookTemplate {
            id: 5,
            name: "无格线 4x5".into(),
            grid_type: GridType::Plain,
            grid_rows: 4,
            grid_cols: 5,
            header_ratio: 0.05,
            description: "无格线诗抄纸".into(),
        },
    ]
}
