//! 数学/单位适配
//!
//! 宿主侧使用 glam 的 `Mat4`/`Vec3`/`Quat`，物理侧使用 Rapier (nalgebra) 的
//! `Isometry`/`Vector`/`Rotation`。所有转换集中在这里。
//!
//! 桌面坐标以毫米为单位，物理参数（重力等）以米为单位给出，需要乘以 [`MM_PER_METER`]。

use glam::{Mat4, Quat, Vec3};
use rapier3d::na::{Quaternion, Translation3, UnitQuaternion};
use rapier3d::prelude::*;

/// 每米的毫米数（桌面几何以毫米为单位）
pub const MM_PER_METER: f32 = 1000.0;

/// 将 glam Mat4 转换为 Rapier Isometry（缩放被丢弃）
pub fn mat4_to_isometry(mat: Mat4) -> Isometry<Real> {
    let (_, rotation, translation) = mat.to_scale_rotation_translation();
    Isometry::from_parts(
        Translation3::new(translation.x, translation.y, translation.z),
        quat_to_rotation(rotation),
    )
}

/// 将 Rapier Isometry 转换为 glam Mat4
pub fn isometry_to_mat4(iso: &Isometry<Real>) -> Mat4 {
    let t = iso.translation.vector;
    Mat4::from_rotation_translation(rotation_to_quat(&iso.rotation), Vec3::new(t.x, t.y, t.z))
}

/// glam Quat -> Rapier Rotation
pub fn quat_to_rotation(q: Quat) -> Rotation<Real> {
    UnitQuaternion::new_normalize(Quaternion::new(q.w, q.x, q.y, q.z))
}

/// Rapier Rotation -> glam Quat
pub fn rotation_to_quat(r: &Rotation<Real>) -> Quat {
    Quat::from_xyzw(r.i, r.j, r.k, r.w)
}

/// 将 glam Vec3 转换为 Rapier Vector
pub fn vec3_to_rapier(v: Vec3) -> Vector<Real> {
    Vector::new(v.x, v.y, v.z)
}

/// 将 Rapier Vector 转换为 glam Vec3
pub fn rapier_to_vec3(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

/// 将 glam Vec3 转换为 Rapier Point
pub fn vec3_to_point(v: Vec3) -> Point<Real> {
    Point::new(v.x, v.y, v.z)
}

/// 提取矩阵的平移部分
pub fn extract_translation(m: &Mat4) -> Vec3 {
    m.w_axis.truncate()
}

/// 提取矩阵的旋转部分（忽略缩放）
pub fn extract_rotation(m: &Mat4) -> Quat {
    let (_, rotation, _) = m.to_scale_rotation_translation();
    rotation
}

/// 仅由位置和旋转构成的矩阵（缩放为 1）
pub fn pose_matrix(position: Vec3, rotation: Quat) -> Mat4 {
    Mat4::from_rotation_translation(rotation, position)
}

/// 绕 X 轴的旋转角（弧度），用于铰链角度测量
///
/// 铰链坐标系的自由轴是局部 X 轴，相对旋转只含绕 X 的分量。
pub fn angle_about_x(r: &Rotation<Real>) -> Real {
    let (roll, _, _) = r.euler_angles();
    roll
}

/// 将任意单位向量旋转到 +X 的旋转（铰链坐标系约定自由轴为 X）
pub fn rotation_x_to(axis: Vec3) -> Quat {
    Quat::from_rotation_arc(Vec3::X, axis.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_3;

    #[test]
    fn test_isometry_roundtrip_keeps_pose() {
        let m = Mat4::from_rotation_translation(
            Quat::from_rotation_z(0.7) * Quat::from_rotation_x(0.2),
            Vec3::new(120.0, -45.0, 30.0),
        );
        let back = isometry_to_mat4(&mat4_to_isometry(m));
        assert!(back.abs_diff_eq(m, 1e-4));
    }

    #[test]
    fn test_scale_is_dropped() {
        let m = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            Quat::IDENTITY,
            Vec3::new(1.0, 2.0, 3.0),
        );
        let iso = mat4_to_isometry(m);
        assert!((iso.translation.vector - Vector::new(1.0, 2.0, 3.0)).norm() < 1e-5);
        assert!(iso.rotation.angle() < 1e-5);
    }

    #[test]
    fn test_angle_about_x() {
        let r = quat_to_rotation(Quat::from_rotation_x(FRAC_PI_3));
        assert!((angle_about_x(&r) - FRAC_PI_3).abs() < 1e-5);
    }

    #[test]
    fn test_rotation_x_to_z_maps_axis() {
        let q = rotation_x_to(Vec3::Z);
        assert!((q * Vec3::X).abs_diff_eq(Vec3::Z, 1e-5));
        // Z 轴旋转共轭后等价于 X 轴旋转
        let rz = Quat::from_rotation_z(0.4);
        let conj = q.inverse() * rz * q;
        assert!((conj * Vec3::Y).abs_diff_eq(Quat::from_rotation_x(0.4) * Vec3::Y, 1e-5));
    }
}
