use serde_json::{json, Value};
use uuid::Uuid;

/// When a queued command becomes safe to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Safe once the remote surface exists.
    Immediate,
    /// Additionally requires the first payload to have rendered.
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Write,
    Read,
}

/// The closed set of remote capabilities the proxy can invoke.
///
/// Each variant carries its wire payload; the tier and write/read
/// classification live here so they are checked at compile time rather
/// than looked up by method-name string at dispatch time.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerCommand {
    SetImage(Value),
    SetBackgroundColor([f64; 3]),
    SetColorMap(String),
    SetAnnotationsEnabled(bool),
    SetRotateEnabled(bool),
    SetUiCollapsed(bool),
    SetAxesEnabled(bool),
    GetBackgroundColor,
    GetColorMap,
    SetImageColorRange([f64; 2]),
    GetImageColorRange,
    CaptureImage,
}

impl ViewerCommand {
    /// Method name on the remote surface.
    pub fn method(&self) -> &'static str {
        match self {
            ViewerCommand::SetImage(_) => "setImage",
            ViewerCommand::SetBackgroundColor(_) => "setBackgroundColor",
            ViewerCommand::SetColorMap(_) => "setColorMap",
            ViewerCommand::SetAnnotationsEnabled(_) => "setAnnotationsEnabled",
            ViewerCommand::SetRotateEnabled(_) => "setRotateEnabled",
            ViewerCommand::SetUiCollapsed(_) => "setUiCollapsed",
            ViewerCommand::SetAxesEnabled(_) => "setAxesEnabled",
            ViewerCommand::GetBackgroundColor => "getBackgroundColor",
            ViewerCommand::GetColorMap => "getColorMap",
            ViewerCommand::SetImageColorRange(_) => "setImageColorRange",
            ViewerCommand::GetImageColorRange => "getImageColorRange",
            ViewerCommand::CaptureImage => "captureImage",
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            ViewerCommand::GetBackgroundColor
            | ViewerCommand::GetColorMap
            | ViewerCommand::GetImageColorRange
            | ViewerCommand::CaptureImage => CommandKind::Read,
            _ => CommandKind::Write,
        }
    }

    /// Color-range and capture calls only make sense against rendered
    /// data; everything else just needs the surface to exist.
    pub fn tier(&self) -> Tier {
        match self {
            ViewerCommand::SetImageColorRange(_)
            | ViewerCommand::GetImageColorRange
            | ViewerCommand::CaptureImage => Tier::Deferred,
            _ => Tier::Immediate,
        }
    }

    /// Wire-ready argument payload. Reads carry no arguments.
    pub fn payload(&self) -> Value {
        match self {
            ViewerCommand::SetImage(image) => image.clone(),
            ViewerCommand::SetBackgroundColor(rgb) => json!(rgb),
            ViewerCommand::SetColorMap(name) => json!(name),
            ViewerCommand::SetAnnotationsEnabled(enabled) => json!(enabled),
            ViewerCommand::SetRotateEnabled(enabled) => json!(enabled),
            ViewerCommand::SetUiCollapsed(collapsed) => json!(collapsed),
            ViewerCommand::SetAxesEnabled(enabled) => json!(enabled),
            ViewerCommand::SetImageColorRange(range) => json!(range),
            ViewerCommand::GetBackgroundColor
            | ViewerCommand::GetColorMap
            | ViewerCommand::GetImageColorRange
            | ViewerCommand::CaptureImage => Value::Null,
        }
    }
}

/// A command waiting in (or passing through) an endpoint's queue.
/// Reads carry the pending-table ticket their reply resolves.
#[derive(Debug)]
pub struct QueuedCommand {
    pub command: ViewerCommand,
    pub ticket: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_reads() {
        for command in [
            ViewerCommand::GetBackgroundColor,
            ViewerCommand::GetColorMap,
            ViewerCommand::GetImageColorRange,
            ViewerCommand::CaptureImage,
        ] {
            assert_eq!(command.kind(), CommandKind::Read);
            assert_eq!(command.payload(), Value::Null);
        }
    }

    #[test]
    fn rendered_data_commands_are_deferred() {
        assert_eq!(ViewerCommand::SetImageColorRange([0.0, 1.0]).tier(), Tier::Deferred);
        assert_eq!(ViewerCommand::GetImageColorRange.tier(), Tier::Deferred);
        assert_eq!(ViewerCommand::CaptureImage.tier(), Tier::Deferred);
        assert_eq!(ViewerCommand::SetImage(Value::Null).tier(), Tier::Immediate);
        assert_eq!(ViewerCommand::GetBackgroundColor.tier(), Tier::Immediate);
    }

    #[test]
    fn method_names_match_wire_convention() {
        assert_eq!(ViewerCommand::SetBackgroundColor([0.0; 3]).method(), "setBackgroundColor");
        assert_eq!(ViewerCommand::SetUiCollapsed(true).method(), "setUiCollapsed");
        assert_eq!(ViewerCommand::CaptureImage.method(), "captureImage");
    }
}
