//! 子网格合并

use glam::Vec3;

use super::MeshData;

/// 合并后的三角形列表（物体局部空间）
#[derive(Clone, Debug, Default)]
pub struct TriangleList {
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl TriangleList {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}

/// 将多个子网格合并为一个三角形列表
///
/// 每个子网格的顶点先经过它自己的局部变换。越界的三角形被丢弃。
pub fn combine_meshes(meshes: &[MeshData]) -> TriangleList {
    let mut list = TriangleList::default();

    for mesh in meshes {
        let base = list.vertices.len() as u32;
        let vertex_count = mesh.vertices.len() as u32;
        list.vertices
            .extend(mesh.vertices.iter().map(|v| mesh.transform.transform_point3(*v)));

        let mut dropped = 0usize;
        for tri in mesh.indices.chunks_exact(3) {
            if tri.iter().any(|&i| i >= vertex_count) {
                dropped += 1;
                continue;
            }
            list.triangles.push([base + tri[0], base + tri[1], base + tri[2]]);
        }
        if dropped > 0 {
            log::warn!("[网格合并] 丢弃 {} 个越界三角形", dropped);
        }
    }

    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    fn quad() -> MeshData {
        MeshData::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn test_combine_offsets_indices_and_applies_transform() {
        let moved = quad().with_transform(Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        let list = combine_meshes(&[quad(), moved]);
        assert_eq!(list.vertices.len(), 8);
        assert_eq!(list.triangle_count(), 4);
        assert_eq!(list.triangles[2], [4, 5, 6]);
        assert_eq!(list.vertices[5], Vec3::new(11.0, 0.0, 0.0));
    }

    #[test]
    fn test_out_of_range_triangles_dropped() {
        let mut mesh = quad();
        mesh.indices.extend_from_slice(&[0, 1, 9]);
        let list = combine_meshes(&[mesh]);
        assert_eq!(list.triangle_count(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(combine_meshes(&[]).is_empty());
    }
}
