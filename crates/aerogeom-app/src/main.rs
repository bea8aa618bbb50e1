//! AeroGeom 模型检查工具
//!
//! 用法: `aerogeom <model.agm|model.json> [--verbose]`
//!
//! 加载模型，输出每个部件解析后的定位森林，以及每个截面元素的全局放置量。

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use aerogeom_core::component::Component;
use aerogeom_core::element::ReferenceFrame;
use aerogeom_core::math::{Point3, Vector3};
use aerogeom_core::positioning::PositioningTree;

#[derive(Parser)]
#[command(name = "aerogeom")]
#[command(about = "Inspect the section element placement of an aircraft model")]
struct Args {
    /// 模型文件（.agm 或 .json）
    model: PathBuf,

    /// 输出调试日志
    #[arg(short, long)]
    verbose: bool,
}

fn log_positionings(component: &Component, tree: &PositioningTree) {
    let nodes = tree.nodes();
    let mut stack: Vec<(usize, usize)> = tree.roots().iter().rev().map(|&i| (i, 0)).collect();
    while let Some((index, depth)) = stack.pop() {
        let node = &nodes[index];
        let from = if node.is_root() { "<origin>" } else { node.from_uid.as_str() };
        info!(
            "{} {}{} -> {} (length {}, sweep {}°, dihedral {}°) outer point {}",
            component.uid(),
            "  ".repeat(depth),
            from,
            node.to_uid,
            node.length,
            node.sweep_angle,
            node.dihedral_angle,
            format_point(&node.outer_point)
        );
        stack.extend(node.children.iter().rev().map(|&child| (child, depth + 1)));
    }
}

fn format_point(p: &Point3) -> String {
    format!("({:.4}, {:.4}, {:.4})", p.x, p.y, p.z)
}

fn format_vector(v: &Vector3) -> String {
    format!("({:.4}, {:.4}, {:.4})", v.x, v.y, v.z)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing::subscriber::set_global_default(FmtSubscriber::builder().with_max_level(level).finish())?;

    let document = aerogeom_file::open(&args.model)
        .with_context(|| format!("failed to open {}", args.model.display()))?;
    info!("Model: {}", document.metadata.title);

    let config = document.configuration().context("invalid model")?;

    for component in config.components() {
        let tree = component.positioning_tree()?;
        log_positionings(component, &tree);
    }

    let frame = ReferenceFrame::Global;
    for component in config.components() {
        println!("{} [{}]", component.uid(), component.kind().name());
        for section in component.sections() {
            for element in section.elements() {
                println!("  {}", element.uid());
                println!("    origin  {}", format_point(&element.origin(frame)?));
                println!("    center  {}", format_point(&element.center(frame)?));
                println!("    normal  {}", format_vector(&element.normal(frame)?));
                println!(
                    "    width {:.4}  height {:.4}  area {:.4}",
                    element.width(frame)?,
                    element.height(frame)?,
                    element.area(frame)?
                );
            }
        }
    }

    Ok(())
}
