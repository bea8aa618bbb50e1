//! 测试用构型

use crate::component::{Component, ComponentKind};
use crate::configuration::Configuration;
use crate::math::Point3;
use crate::profile::Profile;
use crate::settings::EngineSettings;
use crate::transform::Transformation;
use std::rc::Rc;

pub(crate) struct WingFixture {
    pub config: Configuration,
    pub wing: Rc<Component>,
    pub profile: Rc<Profile>,
}

/// 2 × 0.5 的矩形轮廓，位于 XZ 平面，x ∈ [0, 2]
pub(crate) fn rectangle_points() -> Vec<Point3> {
    vec![
        Point3::new(0.0, 0.0, -0.25),
        Point3::new(2.0, 0.0, -0.25),
        Point3::new(2.0, 0.0, 0.25),
        Point3::new(0.0, 0.0, 0.25),
    ]
}

/// 两个截面的直机翼：根截面在原点，梢截面沿 y 轴 5 个单位处
pub(crate) fn simple_wing() -> WingFixture {
    let (config, wing, profile) = straight_component(ComponentKind::Wing, "W1");
    WingFixture {
        config,
        wing,
        profile,
    }
}

/// 任意类型的两截面直部件，截面为 `{uid}_Sec1`、`{uid}_Sec2`，
/// 元素为 `{uid}_Sec1_Elem1`、`{uid}_Sec2_Elem1`
pub(crate) fn straight_component(
    kind: ComponentKind,
    uid: &str,
) -> (Configuration, Rc<Component>, Rc<Profile>) {
    let mut config = Configuration::new(EngineSettings::default());
    let profile = config
        .add_profile("P_rect", "rectangle", rectangle_points())
        .unwrap();
    let component = config
        .add_component(uid, &kind.name().to_lowercase(), kind)
        .unwrap();

    let root = format!("{}_Sec1", uid);
    let tip = format!("{}_Sec2", uid);
    for section_uid in [&root, &tip] {
        component
            .add_section(section_uid, "", Transformation::identity())
            .unwrap()
            .add_element(&format!("{}_Elem1", section_uid), "", "P_rect", Transformation::identity())
            .unwrap();
    }

    component
        .add_positioning("", "root", "", &root, 0.0, 0.0, 0.0)
        .unwrap();
    component
        .add_positioning("", "tip", &root, &tip, 5.0, 0.0, 0.0)
        .unwrap();
    component
        .add_segment(&format!("{}_Seg1", uid), "", &format!("{}_Elem1", root), &format!("{}_Elem1", tip))
        .unwrap();

    (config, component, profile)
}
