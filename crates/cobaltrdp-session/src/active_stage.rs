use cobaltrdp_connector::ConnectionResult;
use cobaltrdp_pdu::mcs::DisconnectReason;
use cobaltrdp_pdu::Action;

use crate::x224::SlowPathOutcome;
use crate::{fast_path, x224, Framebuffer, PointerState, SessionResult};

/// Dispatches one incoming frame during the active phase.
pub struct ActiveStage {
    fast_path_processor: fast_path::Processor,
    x224_processor: x224::Processor,
}

/// What a processed frame produced.
#[derive(Debug, PartialEq, Eq)]
pub enum ActiveStageOutput {
    /// Graphics changed; the framebuffer version advanced.
    GraphicsUpdated,
    /// Pointer state may have changed; no graphics change.
    Handled,
    /// The server ended the session.
    Terminate(DisconnectReason),
}

impl ActiveStage {
    pub fn new(connection: &ConnectionResult) -> Self {
        Self {
            fast_path_processor: fast_path::Processor::new(),
            x224_processor: x224::Processor::new(connection.io_channel_id),
        }
    }

    /// Applies one frame to the shared state, in reception order.
    pub fn process(
        &mut self,
        framebuffer: &mut Framebuffer,
        pointer: &mut PointerState,
        action: Action,
        frame: &[u8],
    ) -> SessionResult<ActiveStageOutput> {
        match action {
            Action::FastPath => {
                let updated = self.fast_path_processor.process(framebuffer, pointer, frame)?;

                if updated {
                    Ok(ActiveStageOutput::GraphicsUpdated)
                } else {
                    Ok(ActiveStageOutput::Handled)
                }
            }
            Action::X224 => match self.x224_processor.process(framebuffer, pointer, frame)? {
                SlowPathOutcome::Handled => Ok(ActiveStageOutput::Handled),
                SlowPathOutcome::Disconnected(reason) => Ok(ActiveStageOutput::Terminate(reason)),
            },
        }
    }
}
