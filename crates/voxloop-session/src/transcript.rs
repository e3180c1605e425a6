use voxloop_core::TurnRecord;

/// Accumulates partial transcript text for the turn in progress. The
/// remote service streams deltas for both sides of the conversation;
/// nothing here is final until the turn boundary arrives.
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    input_so_far: String,
    output_so_far: String,
}

impl TurnAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_input(&mut self, text: &str) {
        self.input_so_far.push_str(text);
    }

    pub fn push_output(&mut self, text: &str) {
        self.output_so_far.push_str(text);
    }

    /// Close out the turn. Returns a record when either side said
    /// something; both buffers reset either way so one turn's text
    /// cannot leak into the next.
    pub fn complete(&mut self) -> Option<TurnRecord> {
        let user = std::mem::take(&mut self.input_so_far);
        let model = std::mem::take(&mut self.output_so_far);
        if user.trim().is_empty() && model.trim().is_empty() {
            return None;
        }
        Some(TurnRecord { user, model })
    }

    pub fn is_empty(&self) -> bool {
        self.input_so_far.is_empty() && self.output_so_far.is_empty()
    }
}
