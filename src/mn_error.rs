use std::{error, fmt};

/// Unified error type
///
/// Animation and simulation routines that can fail return this enum. The
/// deliberately small set of variants maps to caller mistakes that are cheap
/// to detect at an API boundary: bad frame ranges, postures that do not match
/// the skeleton they are applied to, broken bone links, and motion-graph
/// parameters that cannot produce a valid segmentation. Numerical failure of
/// the inverse-kinematics solve is *not* an error — the solver reports it
/// through its boolean result and rolls the posture back instead.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MnError {
    InvalidFrameRange,
    PostureLengthMismatch,
    BoneIndexOutOfRange,
    BrokenBoneLink,
    EmptySkeleton,
    DuplicateBoneName,
    UnknownParentBone,
    RootMustBeFirst,
    ChainNotConnected,
    TargetCountMismatch,
    SkeletonMismatch,
    EmptyMotionList,
    MotionTooShort,
    BlendWindowTooLarge,
    SolverFailed,
}

impl error::Error for MnError {}

impl fmt::Display for MnError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidFrameRange => write!(f, "invalid start or end frame"),
            Self::PostureLengthMismatch => {
                write!(f, "posture length does not match skeleton bone count")
            }
            Self::BoneIndexOutOfRange => write!(f, "bone index out of range"),
            Self::BrokenBoneLink => {
                write!(f, "bone links do not form a single tree")
            }
            Self::EmptySkeleton => write!(f, "skeleton has no bones"),
            Self::DuplicateBoneName => write!(f, "bone name already in use"),
            Self::UnknownParentBone => write!(f, "parent bone name not found"),
            Self::RootMustBeFirst => {
                write!(f, "the first bone must be the parentless root")
            }
            Self::ChainNotConnected => {
                write!(f, "end bone is not a descendant of the chain base")
            }
            Self::TargetCountMismatch => {
                write!(f, "target count does not match chain count")
            }
            Self::SkeletonMismatch => {
                write!(f, "motions are built on different skeletons")
            }
            Self::EmptyMotionList => write!(f, "no motions supplied"),
            Self::MotionTooShort => {
                write!(f, "motion is shorter than one segment")
            }
            Self::BlendWindowTooLarge => {
                write!(f, "blend window does not fit the segment size")
            }
            Self::SolverFailed => {
                write!(f, "least squares solve failed")
            }
        }
    }
}
