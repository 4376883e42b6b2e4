//! G-code program model
//!
//! Aggregates parsed [`GLine`]s into a job: tracks modal state (units,
//! positioning mode, extrusion mode) across the program, groups lines into
//! [`Layer`]s on Z changes, and precomputes the bounding box and filament
//! usage for preflight inspection.

pub mod line;

pub use line::{strip_comments, GLine};

/// A run of consecutive lines printed at one Z height.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Z height the layer starts at, when one was ever commanded.
    pub z: Option<f64>,
    /// Index range into [`GCode::lines`].
    pub lines: std::ops::Range<usize>,
}

/// Axis-aligned extents of the extruding moves of a job.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    pub zmin: f64,
    pub zmax: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn depth(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn height(&self) -> f64 {
        self.zmax - self.zmin
    }
}

/// Running analysis state threaded through parsing and appends.
#[derive(Debug, Clone)]
struct ModalState {
    imperial: bool,
    relative: bool,
    relative_e: bool,
    cur_x: f64,
    cur_y: f64,
    cur_z: f64,
    cur_e: f64,
    total_e: f64,
    max_e: f64,
    prev_z: Option<f64>,
    // Raw bounds; +/-inf until the first extruding move.
    xmin: f64,
    xmax: f64,
    ymin: f64,
    ymax: f64,
    zmin: f64,
    zmax: f64,
}

impl Default for ModalState {
    fn default() -> Self {
        Self {
            imperial: false,
            relative: false,
            relative_e: false,
            cur_x: 0.0,
            cur_y: 0.0,
            cur_z: 0.0,
            cur_e: 0.0,
            total_e: 0.0,
            max_e: 0.0,
            prev_z: None,
            xmin: f64::INFINITY,
            xmax: f64::NEG_INFINITY,
            ymin: f64::INFINITY,
            ymax: f64::NEG_INFINITY,
            zmin: 0.0,
            zmax: f64::NEG_INFINITY,
        }
    }
}

/// A parsed G-code job.
///
/// Lines keep their source order; whitespace-only input lines are dropped at
/// construction, comment lines are kept (the sender skips them without
/// consuming a line number).
#[derive(Debug, Clone, Default)]
pub struct GCode {
    lines: Vec<GLine>,
    layer_idxs: Vec<u32>,
    layers: Vec<Layer>,
    state: ModalState,
}

impl GCode {
    /// Parse a job from an iterator of raw lines.
    pub fn from_lines<I, S>(raw_lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut gcode = GCode::default();
        for raw in raw_lines {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            gcode.push_line(raw);
        }
        gcode
    }

    /// Parse a job from a whole file's text.
    pub fn from_text(text: &str) -> Self {
        Self::from_lines(text.lines())
    }

    /// Append one command to a live job (used while a print is running).
    ///
    /// Returns the parsed line, or `None` when the command is blank.
    pub fn append(&mut self, raw: &str) -> Option<&GLine> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        self.push_line(raw);
        self.lines.last()
    }

    fn push_line(&mut self, raw: &str) {
        let mut line = GLine::parse_with_units(raw, self.state.imperial);

        // Modal flags describe the state this line executes under.
        if line.is_move {
            line.relative = self.state.relative;
            line.relative_e = self.state.relative_e;
        }
        match line.command.as_deref() {
            Some("G20") => self.state.imperial = true,
            Some("G21") => self.state.imperial = false,
            Some("G90") => {
                self.state.relative = false;
                self.state.relative_e = false;
            }
            Some("G91") => {
                self.state.relative = true;
                self.state.relative_e = true;
            }
            Some("M82") => self.state.relative_e = false,
            Some("M83") => self.state.relative_e = true,
            _ => {}
        }

        self.track_extrusion(&line);
        self.track_position(&line);

        let index = self.lines.len();
        let cur_z = self.state.cur_z;
        let z_changed = self.state.prev_z.is_some_and(|z| z != cur_z);
        if z_changed || self.layers.is_empty() {
            self.layers.push(Layer {
                z: Some(cur_z),
                lines: index..index + 1,
            });
        } else if let Some(layer) = self.layers.last_mut() {
            layer.lines.end = index + 1;
        }
        self.state.prev_z = Some(cur_z);
        self.layer_idxs.push(self.layers.len() as u32 - 1);
        self.lines.push(line);
    }

    fn track_extrusion(&mut self, line: &GLine) {
        let Some(e) = line.e else { return };
        if line.is_move {
            if line.relative_e {
                self.state.total_e += e;
            } else {
                self.state.total_e += e - self.state.cur_e;
                self.state.cur_e = e;
            }
            self.state.max_e = self.state.max_e.max(self.state.total_e);
        } else if line.command.as_deref() == Some("G92") {
            self.state.cur_e = e;
        }
    }

    fn track_position(&mut self, line: &GLine) {
        let st = &mut self.state;
        if line.is_move {
            let (mut x, mut y, mut z) = (line.x, line.y, line.z);
            if line.relative {
                x = x.map(|v| st.cur_x + v);
                y = y.map(|v| st.cur_y + v);
                z = z.map(|v| st.cur_z + v);
            }
            st.cur_x = x.unwrap_or(st.cur_x);
            st.cur_y = y.unwrap_or(st.cur_y);
            st.cur_z = z.unwrap_or(st.cur_z);

            // Only extruding moves count towards the printed extents.
            if line.e.is_some() {
                if let Some(x) = x {
                    st.xmin = st.xmin.min(x);
                    st.xmax = st.xmax.max(x);
                }
                if let Some(y) = y {
                    st.ymin = st.ymin.min(y);
                    st.ymax = st.ymax.max(y);
                }
                st.zmin = st.zmin.min(st.cur_z);
                st.zmax = st.zmax.max(st.cur_z);
            }
        } else if line.command.as_deref() == Some("G92") {
            st.cur_x = line.x.unwrap_or(st.cur_x);
            st.cur_y = line.y.unwrap_or(st.cur_y);
            st.cur_z = line.z.unwrap_or(st.cur_z);
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> Option<&GLine> {
        self.lines.get(index)
    }

    pub fn lines(&self) -> &[GLine] {
        &self.lines
    }

    /// Layers in source order.
    pub fn all_layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Layer index a line belongs to.
    pub fn layer_index_of(&self, line_index: usize) -> Option<u32> {
        self.layer_idxs.get(line_index).copied()
    }

    /// Total filament length consumed by the job, in millimetres.
    pub fn filament_length(&self) -> f64 {
        self.state.max_e
    }

    /// Extents of the extruding moves; zeroed axes never printed on.
    pub fn bounding_box(&self) -> BoundingBox {
        let finite = |v: f64| if v.is_finite() { v } else { 0.0 };
        BoundingBox {
            xmin: finite(self.state.xmin),
            xmax: finite(self.state.xmax),
            ymin: finite(self.state.ymin),
            ymax: finite(self.state.ymax),
            zmin: finite(self.state.zmin),
            zmax: finite(self.state.zmax),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_blank_lines_keeps_comments() {
        let gcode = GCode::from_lines(["G28", "", "   ", "; comment", "G1 X1 E1"]);
        assert_eq!(gcode.len(), 3);
        assert_eq!(gcode.line(1).unwrap().command, None);
    }

    #[test]
    fn modal_flags_follow_g91() {
        let gcode = GCode::from_lines(["G91", "G1 X1", "G90", "G1 X2"]);
        assert!(gcode.line(1).unwrap().relative);
        assert!(!gcode.line(3).unwrap().relative);
    }

    #[test]
    fn m83_sets_relative_extrusion_only() {
        let gcode = GCode::from_lines(["M83", "G1 X1 E1"]);
        let line = gcode.line(1).unwrap();
        assert!(line.relative_e);
        assert!(!line.relative);
    }

    #[test]
    fn imperial_mode_scales_following_lines() {
        let gcode = GCode::from_lines(["G20", "G1 X1", "G21", "G1 X1"]);
        assert_eq!(gcode.line(1).unwrap().x, Some(25.4));
        assert_eq!(gcode.line(3).unwrap().x, Some(1.0));
    }

    #[test]
    fn layers_split_on_z_change() {
        let gcode = GCode::from_lines([
            "G28",          // layer 0 (z 0)
            "G1 Z0.2 E0.1", // layer 1
            "G1 X10 E1",    // layer 1
            "G1 Z0.4",      // layer 2
            "G1 X0 E2",     // layer 2
        ]);
        assert_eq!(gcode.num_layers(), 3);
        assert_eq!(gcode.layer_index_of(0), Some(0));
        assert_eq!(gcode.layer_index_of(1), Some(1));
        assert_eq!(gcode.layer_index_of(2), Some(1));
        assert_eq!(gcode.layer_index_of(3), Some(2));
        assert_eq!(gcode.all_layers()[2].z, Some(0.4));
    }

    #[test]
    fn g92_z_starts_new_layer() {
        let gcode = GCode::from_lines(["G1 X0", "G92 Z5", "G1 X1"]);
        assert_eq!(gcode.layer_index_of(0), Some(0));
        assert_eq!(gcode.layer_index_of(1), Some(1));
        assert_eq!(gcode.layer_index_of(2), Some(1));
    }

    #[test]
    fn filament_length_absolute_extrusion() {
        let gcode = GCode::from_lines(["G1 X1 E1.5", "G1 X2 E4.0"]);
        assert_eq!(gcode.filament_length(), 4.0);
    }

    #[test]
    fn filament_length_honours_g92_reset() {
        let gcode = GCode::from_lines(["G1 E2", "G92 E0", "G1 E3"]);
        assert_eq!(gcode.filament_length(), 5.0);
    }

    #[test]
    fn filament_length_relative_extrusion() {
        let gcode = GCode::from_lines(["M83", "G1 E1", "G1 E2"]);
        assert_eq!(gcode.filament_length(), 3.0);
    }

    #[test]
    fn bounding_box_tracks_extruding_moves_only() {
        let gcode = GCode::from_lines([
            "G0 X100 Y100", // travel, ignored
            "G1 X10 Y20 E1",
            "G1 X-5 Y40 E2",
        ]);
        let bbox = gcode.bounding_box();
        assert_eq!(bbox.xmin, -5.0);
        assert_eq!(bbox.xmax, 10.0);
        assert_eq!(bbox.ymin, 20.0);
        assert_eq!(bbox.ymax, 40.0);
        assert_eq!(bbox.width(), 15.0);
        assert_eq!(bbox.depth(), 20.0);
    }

    #[test]
    fn relative_moves_accumulate_position() {
        let gcode = GCode::from_lines(["G1 X10 E1", "G91", "G1 X5 E1", "G1 X5 E1"]);
        let bbox = gcode.bounding_box();
        assert_eq!(bbox.xmax, 20.0);
    }

    #[test]
    fn append_extends_job_and_layers() {
        let mut gcode = GCode::from_lines(["G28"]);
        assert!(gcode.append("   ").is_none());
        let line = gcode.append("G1 X5").expect("parsed");
        assert_eq!(line.command.as_deref(), Some("G1"));
        assert_eq!(gcode.len(), 2);
        assert_eq!(gcode.layer_index_of(1), Some(0));
    }

    #[test]
    fn empty_job() {
        let gcode = GCode::from_lines(Vec::<String>::new());
        assert!(gcode.is_empty());
        assert_eq!(gcode.num_layers(), 0);
        assert_eq!(gcode.bounding_box(), BoundingBox::default());
    }
}
