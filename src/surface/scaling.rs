/// Linear map from the logical resolution the agent reasons in to the
/// resolution of the remote input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateScaler {
    logical: (u32, u32),
    device: (u32, u32),
}

impl CoordinateScaler {
    pub fn new(logical: (u32, u32), device: (u32, u32)) -> Self {
        Self {
            logical: (logical.0.max(1), logical.1.max(1)),
            device: (device.0.max(1), device.1.max(1)),
        }
    }

    /// Scale, round and clamp to `[0, device - 1]`.
    pub fn to_device(&self, x: u32, y: u32) -> (u32, u32) {
        (
            scale_axis(x, self.logical.0, self.device.0),
            scale_axis(y, self.logical.1, self.device.1),
        )
    }
}

fn scale_axis(v: u32, logical: u32, device: u32) -> u32 {
    let scaled = (f64::from(v) / f64::from(logical) * f64::from(device)).round();
    scaled.clamp(0.0, f64::from(device - 1)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tablet_centre_maps_to_device_centre() {
        let s = CoordinateScaler::new((1000, 1000), (1080, 2280));
        assert_eq!(s.to_device(500, 500), (540, 1140));
    }

    #[test]
    fn edges_are_clamped() {
        let s = CoordinateScaler::new((1000, 1000), (1080, 2280));
        assert_eq!(s.to_device(0, 0), (0, 0));
        assert_eq!(s.to_device(1000, 1000), (1079, 2279));
    }

    #[test]
    fn scaling_is_idempotent_and_monotonic() {
        let s = CoordinateScaler::new((800, 600), (1366, 768));
        let mut prev = (0, 0);
        for v in 0..=800u32 {
            let a = s.to_device(v, v.min(600));
            assert_eq!(a, s.to_device(v, v.min(600)));
            assert!(a.0 >= prev.0 && a.1 >= prev.1);
            prev = a;
        }
    }

    #[test]
    fn identity_when_resolutions_match() {
        let s = CoordinateScaler::new((800, 600), (800, 600));
        assert_eq!(s.to_device(400, 300), (400, 300));
        assert_eq!(s.to_device(799, 599), (799, 599));
    }
}
