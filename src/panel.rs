// Panel controller module
// Visibility of the settings panel; no effect on the watermark itself

/// Space kept between the panel and the window edge when it slides out
const SLIDE_MARGIN: f32 = 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleIcon {
    /// Panel shown; arrow points to where it will go
    Right,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Panel {
    visible: bool,
}

impl Default for Panel {
    fn default() -> Self {
        Self { visible: true }
    }
}

impl Panel {
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }

    /// Horizontal slide of a panel `panel_width` wide
    pub fn translate_x(&self, panel_width: f32) -> f32 {
        if self.visible {
            0.0
        } else {
            panel_width + SLIDE_MARGIN
        }
    }

    pub fn icon(&self) -> ToggleIcon {
        if self.visible {
            ToggleIcon::Right
        } else {
            ToggleIcon::Left
        }
    }
}
