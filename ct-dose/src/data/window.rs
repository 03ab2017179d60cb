/// CT 窗口, 包含窗位 (window level) 和窗宽 (window width), 单位为 HU.
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CtWindow {
    level: i32,
    width: i32,
}

impl CtWindow {
    /// 构建 CT 窗.
    ///
    /// `level` 和 `width` 必须在合理范围内, 否则返回 `None`.
    pub fn new(level: i32, width: i32) -> Option<CtWindow> {
        if (-100_000..=100_000).contains(&level) && 0 < width && width <= 100_000 {
            Some(Self { level, width })
        } else {
            None
        }
    }

    /// 便于观察骨结构的 CT 窗口. 窗位为 400, 窗宽为 2000.
    #[inline]
    pub const fn from_bone_visual() -> CtWindow {
        Self {
            level: 400,
            width: 2000,
        }
    }

    /// 便于观察脑组织的 CT 窗口. 窗位为 35, 窗宽为 70.
    #[inline]
    pub const fn from_brain_visual() -> CtWindow {
        Self {
            level: 35,
            width: 70,
        }
    }

    /// 便于观察腹部软组织的 CT 窗口. 窗位为 40, 窗宽为 400.
    #[inline]
    pub const fn from_abdomen_visual() -> CtWindow {
        Self {
            level: 40,
            width: 400,
        }
    }

    /// 窗下限 `level - width / 2` (整数除法).
    #[inline]
    pub fn lower_bound(&self) -> i32 {
        self.level - self.width / 2
    }

    /// 窗上限 `level + width / 2` (整数除法).
    #[inline]
    pub fn upper_bound(&self) -> i32 {
        self.level + self.width / 2
    }

    /// 窗位.
    #[inline]
    pub fn level(&self) -> i32 {
        self.level
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> i32 {
        self.width
    }

    /// 把 `ct` 截断到 `[下限, 上限]` 之内.
    #[inline]
    pub fn clip(&self, ct: i16) -> i16 {
        let v = (ct as i32).clamp(self.lower_bound(), self.upper_bound());
        v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }

    /// 求在当前 CT 窗设置下, `ct` HU 值对应的灰度图像素整数值 (0 <= value <= 255)
    pub fn eval(&self, ct: i16) -> u8 {
        let (lb, ub) = (self.lower_bound(), self.upper_bound());
        let ct = ct as i32;
        if ct <= lb {
            u8::MIN
        } else if ct >= ub {
            u8::MAX
        } else {
            // 255, not 256.
            ((ct - lb) as f32 / (ub - lb) as f32 * 255.0) as u8
        }
    }

    /// 求在当前 CT 窗设置下, `ct` HU 值对应的灰度图像素分布点 (0.0 <= value <= 255.0).
    pub fn eval_f32(&self, ct: i16) -> f32 {
        let (lb, ub) = (self.lower_bound(), self.upper_bound());
        let ct = ct as i32;
        if ct <= lb {
            0.0
        } else if ct >= ub {
            255.0
        } else {
            (ct - lb) as f32 / (ub - lb) as f32 * 255.0
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::CtWindow;

    fn is_valid_init(level: i32, width: i32) -> bool {
        CtWindow::new(level, width).is_some()
    }

    #[test]
    fn test_ct_window_invalid_input() {
        assert!(!is_valid_init(0, -1));
        assert!(!is_valid_init(0, 0));
        assert!(is_valid_init(-600, 1500));
    }

    fn float_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_ct_window_generic() {
        // [60, 100]
        let ct = CtWindow::new(80, 40).unwrap();
        assert_eq!(ct.eval(i16::MIN), 0);
        assert_eq!(ct.eval(i16::MAX), 255);

        assert_eq!(ct.eval(50), 0);
        assert_eq!(ct.eval(60), 0);
        assert!(float_eq(ct.eval_f32(60), 0.0));

        assert_eq!(ct.eval(70), (255.0 * 0.25) as u8);
        assert!(float_eq(ct.eval_f32(70), 255.0 * 0.25));

        assert_eq!(ct.eval(80), (255.0 * 0.5) as u8);
        assert_eq!(ct.eval(99), 248);
        assert_eq!(ct.eval(100), u8::MAX);
    }

    #[test]
    fn test_ct_window_clip() {
        let bone = CtWindow::from_bone_visual();
        assert_eq!(bone.lower_bound(), -600);
        assert_eq!(bone.upper_bound(), 1400);
        assert_eq!(bone.clip(-1000), -600);
        assert_eq!(bone.clip(3000), 1400);
        assert_eq!(bone.clip(0), 0);

        // 奇数窗宽按整数除法
        let ct = CtWindow::new(0, 5).unwrap();
        assert_eq!((ct.lower_bound(), ct.upper_bound()), (-2, 2));
    }
}
