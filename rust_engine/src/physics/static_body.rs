//! 静态物体与台面
//!
//! 静态物体把所有子网格合并为一个三角网格碰撞体，质量恒为 0。

use glam::{Mat4, Vec3};
use rapier3d::prelude::*;

use super::body::{BodyKind, PhyBody};
use crate::math::vec3_to_point;
use crate::table::{combine_meshes, PlayfieldData, StaticSource};
use crate::{PhysicsError, Result};

/// 由静态物体描述创建刚体
///
/// 没有任何三角形时返回 [`PhysicsError::NoCollisionGeometry`]，调用方应跳过该物体。
pub fn build_static(source: &StaticSource, elasticity_scale: f32) -> Result<PhyBody> {
    let list = combine_meshes(&source.meshes);
    if list.is_empty() {
        return Err(PhysicsError::NoCollisionGeometry(source.name.clone()));
    }

    let vertices: Vec<Point<Real>> = list.vertices.iter().map(|v| vec3_to_point(*v)).collect();
    let shape = SharedShape::trimesh(vertices, list.triangles);

    let mut body = PhyBody::new(source.name.clone(), BodyKind::Static, shape, 0.0);
    body.set_properties(0.0, source.friction, source.elasticity * elasticity_scale);
    body.set_matrix(source.transform);
    Ok(body)
}

/// 创建台面：覆盖整个桌面矩形的薄板，上表面位于 z = 0
pub fn build_playfield(data: &PlayfieldData, elasticity_scale: f32) -> PhyBody {
    let half = Vec3::new(data.width * 0.5, data.height * 0.5, data.thickness.max(1.0) * 0.5);
    let shape = SharedShape::cuboid(half.x, half.y, half.z);

    let mut body = PhyBody::new("Playfield", BodyKind::Playfield, shape, 0.0);
    body.set_properties(0.0, data.friction, data.elasticity * elasticity_scale);
    body.set_matrix(Mat4::from_translation(Vec3::new(half.x, half.y, -half.z)));
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::PhyType;
    use crate::table::MeshData;

    fn triangle() -> MeshData {
        MeshData::new(
            vec![Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), Vec3::new(0.0, 10.0, 0.0)],
            vec![0, 1, 2],
        )
    }

    #[test]
    fn test_no_meshes_fails() {
        let source = StaticSource {
            name: String::from("Empty"),
            is_collidable: true,
            ..Default::default()
        };
        match build_static(&source, 1.0) {
            Err(PhysicsError::NoCollisionGeometry(name)) => assert_eq!(name, "Empty"),
            other => panic!("unexpected result: {:?}", other.map(|b| b.name().to_string())),
        }
    }

    #[test]
    fn test_static_from_meshes() {
        let source = StaticSource {
            name: String::from("Wall"),
            is_collidable: true,
            friction: 0.3,
            elasticity: 0.5,
            transform: Mat4::from_translation(Vec3::new(5.0, 5.0, 0.0)),
            meshes: vec![triangle(), triangle()],
        };
        let body = build_static(&source, 2.0).unwrap();
        assert_eq!(body.phy_type(), PhyType::Static);
        assert_eq!(body.mass(), 0.0);
        assert_eq!(body.friction(), 0.3);
        assert_eq!(body.restitution(), 1.0);
        assert_eq!(body.matrix(), source.transform);
    }

    #[test]
    fn test_playfield_top_at_zero() {
        let data = PlayfieldData::default();
        let body = build_playfield(&data, 1.0);
        let center = body.matrix().w_axis.truncate();
        assert_eq!(center, Vec3::new(500.0, 1000.0, -25.0));
        assert_eq!(body.phy_type(), PhyType::Playfield);
    }
}
