pub mod frames;
pub mod lease;
pub mod token;

pub use frames::{
    AttemptDisposedFrame, DataInterceptedFrame, InboundFrame, LifecycleFrame, LifecyclePhase,
    StreamDeltaFrame, StreamDumpConfigFrame,
};
pub use lease::{LeaseClaimFrame, LeaseClaimResultFrame, LeaseReleaseFrame, LeaseReleaseResultFrame};
pub use token::{mint_session_token, should_apply_session_init_token, BootstrapSlot, FrameGate};
