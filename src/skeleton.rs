// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Joint vocabularies, bones and per-frame skeleton observations.
//!
//! Detectors report joint positions in normalized image space: both axes in `[0, 1]`
//! with the origin at the **bottom-left** corner. Everything that draws goes through
//! [`NormalizedPoint::to_pixel`], which flips the vertical axis into the top-left
//! pixel space of [`image::RgbaImage`].

use std::collections::HashMap;
use std::fmt;

/// Which skeleton family an observation or joint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkeletonKind {
    /// Full human body.
    Body,
    /// A single hand.
    Hand,
}

impl fmt::Display for SkeletonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Body => write!(f, "body"),
            Self::Hand => write!(f, "hand"),
        }
    }
}

/// Body joint vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyJoint {
    /// Tip of the nose.
    Nose,
    /// Left eye.
    LeftEye,
    /// Right eye.
    RightEye,
    /// Left ear.
    LeftEar,
    /// Right ear.
    RightEar,
    /// Left shoulder.
    LeftShoulder,
    /// Right shoulder.
    RightShoulder,
    /// Base of the neck, between the shoulders.
    Neck,
    /// Left elbow.
    LeftElbow,
    /// Right elbow.
    RightElbow,
    /// Left wrist.
    LeftWrist,
    /// Right wrist.
    RightWrist,
    /// Left hip.
    LeftHip,
    /// Right hip.
    RightHip,
    /// Center of the pelvis, between the hips.
    Root,
    /// Left knee.
    LeftKnee,
    /// Right knee.
    RightKnee,
    /// Left ankle.
    LeftAnkle,
    /// Right ankle.
    RightAnkle,
}

impl BodyJoint {
    /// Every body joint, head to feet.
    pub const ALL: [Self; 19] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::Neck,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::Root,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    /// Lower camel case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "leftEye",
            Self::RightEye => "rightEye",
            Self::LeftEar => "leftEar",
            Self::RightEar => "rightEar",
            Self::LeftShoulder => "leftShoulder",
            Self::RightShoulder => "rightShoulder",
            Self::Neck => "neck",
            Self::LeftElbow => "leftElbow",
            Self::RightElbow => "rightElbow",
            Self::LeftWrist => "leftWrist",
            Self::RightWrist => "rightWrist",
            Self::LeftHip => "leftHip",
            Self::RightHip => "rightHip",
            Self::Root => "root",
            Self::LeftKnee => "leftKnee",
            Self::RightKnee => "rightKnee",
            Self::LeftAnkle => "leftAnkle",
            Self::RightAnkle => "rightAnkle",
        }
    }
}

/// Hand joint vocabulary, four joints per finger plus the wrist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandJoint {
    /// Wrist, the root of every finger.
    Wrist,
    /// Thumb carpometacarpal joint.
    ThumbCmc,
    /// Thumb metacarpophalangeal joint.
    ThumbMp,
    /// Thumb interphalangeal joint.
    ThumbIp,
    /// Tip of the thumb.
    ThumbTip,
    /// Index finger knuckle.
    IndexMcp,
    /// Index finger middle joint.
    IndexPip,
    /// Index finger joint nearest the tip.
    IndexDip,
    /// Tip of the index finger.
    IndexTip,
    /// Middle finger knuckle.
    MiddleMcp,
    /// Middle finger middle joint.
    MiddlePip,
    /// Middle finger joint nearest the tip.
    MiddleDip,
    /// Tip of the middle finger.
    MiddleTip,
    /// Ring finger knuckle.
    RingMcp,
    /// Ring finger middle joint.
    RingPip,
    /// Ring finger joint nearest the tip.
    RingDip,
    /// Tip of the ring finger.
    RingTip,
    /// Little finger knuckle.
    LittleMcp,
    /// Little finger middle joint.
    LittlePip,
    /// Little finger joint nearest the tip.
    LittleDip,
    /// Tip of the little finger.
    LittleTip,
}

impl HandJoint {
    /// Every hand joint, wrist first then each finger from base to tip.
    pub const ALL: [Self; 21] = [
        Self::Wrist,
        Self::ThumbCmc,
        Self::ThumbMp,
        Self::ThumbIp,
        Self::ThumbTip,
        Self::IndexMcp,
        Self::IndexPip,
        Self::IndexDip,
        Self::IndexTip,
        Self::MiddleMcp,
        Self::MiddlePip,
        Self::MiddleDip,
        Self::MiddleTip,
        Self::RingMcp,
        Self::RingPip,
        Self::RingDip,
        Self::RingTip,
        Self::LittleMcp,
        Self::LittlePip,
        Self::LittleDip,
        Self::LittleTip,
    ];

    /// Lower camel case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Wrist => "wrist",
            Self::ThumbCmc => "thumbCMC",
            Self::ThumbMp => "thumbMP",
            Self::ThumbIp => "thumbIP",
            Self::ThumbTip => "thumbTip",
            Self::IndexMcp => "indexMCP",
            Self::IndexPip => "indexPIP",
            Self::IndexDip => "indexDIP",
            Self::IndexTip => "indexTip",
            Self::MiddleMcp => "middleMCP",
            Self::MiddlePip => "middlePIP",
            Self::MiddleDip => "middleDIP",
            Self::MiddleTip => "middleTip",
            Self::RingMcp => "ringMCP",
            Self::RingPip => "ringPIP",
            Self::RingDip => "ringDIP",
            Self::RingTip => "ringTip",
            Self::LittleMcp => "littleMCP",
            Self::LittlePip => "littlePIP",
            Self::LittleDip => "littleDIP",
            Self::LittleTip => "littleTip",
        }
    }
}

/// A joint from either vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Joint {
    /// Joint of a body skeleton.
    Body(BodyJoint),
    /// Joint of a hand skeleton.
    Hand(HandJoint),
}

impl Joint {
    /// Skeleton family this joint belongs to.
    #[must_use]
    pub const fn kind(self) -> SkeletonKind {
        match self {
            Self::Body(_) => SkeletonKind::Body,
            Self::Hand(_) => SkeletonKind::Hand,
        }
    }

    /// Lower camel case name from the joint's own vocabulary.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Body(joint) => joint.name(),
            Self::Hand(joint) => joint.name(),
        }
    }
}

impl From<BodyJoint> for Joint {
    fn from(joint: BodyJoint) -> Self {
        Self::Body(joint)
    }
}

impl From<HandJoint> for Joint {
    fn from(joint: HandJoint) -> Self {
        Self::Hand(joint)
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A connection drawn between two joints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bone {
    /// Start of the line.
    pub from: Joint,
    /// End of the line.
    pub to: Joint,
}

impl Bone {
    /// Bone between two body joints.
    #[must_use]
    pub const fn body(from: BodyJoint, to: BodyJoint) -> Self {
        Self {
            from: Joint::Body(from),
            to: Joint::Body(to),
        }
    }

    /// Bone between two hand joints.
    #[must_use]
    pub const fn hand(from: HandJoint, to: HandJoint) -> Self {
        Self {
            from: Joint::Hand(from),
            to: Joint::Hand(to),
        }
    }
}

/// Upper body bones: the shoulder line and both arms.
pub const BODY_BONES: [Bone; 5] = [
    Bone::body(BodyJoint::LeftShoulder, BodyJoint::RightShoulder),
    Bone::body(BodyJoint::LeftShoulder, BodyJoint::LeftElbow),
    Bone::body(BodyJoint::LeftElbow, BodyJoint::LeftWrist),
    Bone::body(BodyJoint::RightShoulder, BodyJoint::RightElbow),
    Bone::body(BodyJoint::RightElbow, BodyJoint::RightWrist),
];

/// Joints drawn as dots for the body.
pub const BODY_TARGET_JOINTS: [Joint; 6] = [
    Joint::Body(BodyJoint::LeftShoulder),
    Joint::Body(BodyJoint::RightShoulder),
    Joint::Body(BodyJoint::LeftElbow),
    Joint::Body(BodyJoint::RightElbow),
    Joint::Body(BodyJoint::LeftWrist),
    Joint::Body(BodyJoint::RightWrist),
];

/// Wrist to index fingertip.
pub const HAND_BONES: [Bone; 1] = [Bone::hand(HandJoint::Wrist, HandJoint::IndexTip)];

/// Joints drawn as dots for a hand.
pub const HAND_TARGET_JOINTS: [Joint; 2] = [
    Joint::Hand(HandJoint::Wrist),
    Joint::Hand(HandJoint::IndexTip),
];

/// Wrist to every fingertip.
pub const HAND_FINGERTIP_BONES: [Bone; 5] = [
    Bone::hand(HandJoint::Wrist, HandJoint::ThumbTip),
    Bone::hand(HandJoint::Wrist, HandJoint::IndexTip),
    Bone::hand(HandJoint::Wrist, HandJoint::MiddleTip),
    Bone::hand(HandJoint::Wrist, HandJoint::RingTip),
    Bone::hand(HandJoint::Wrist, HandJoint::LittleTip),
];

/// Joints drawn as dots for a hand with every fingertip.
pub const HAND_FINGERTIP_TARGET_JOINTS: [Joint; 6] = [
    Joint::Hand(HandJoint::Wrist),
    Joint::Hand(HandJoint::ThumbTip),
    Joint::Hand(HandJoint::IndexTip),
    Joint::Hand(HandJoint::MiddleTip),
    Joint::Hand(HandJoint::RingTip),
    Joint::Hand(HandJoint::LittleTip),
];

/// Position in normalized image space, origin bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedPoint {
    /// Fraction of the width, from the left edge.
    pub x: f32,
    /// Fraction of the height, from the bottom edge.
    pub y: f32,
}

impl NormalizedPoint {
    /// Point at `(x, y)` in normalized space.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Map into pixel space of a `width` x `height` image with a top-left origin.
    ///
    /// `(0, 0)` lands on `(0, height)` and `(1, 1)` on `(width, 0)`.
    #[must_use]
    pub fn to_pixel(self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, (1.0 - self.y) * height as f32)
    }
}

/// A single recognized joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointObservation {
    /// Where the joint was seen.
    pub position: NormalizedPoint,
    /// Recognition confidence in `[0, 1]`.
    pub confidence: f32,
}

impl JointObservation {
    /// Observation at `(x, y)` in normalized space.
    #[must_use]
    pub const fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self {
            position: NormalizedPoint::new(x, y),
            confidence,
        }
    }
}

/// One subject's joints in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonObservation {
    kind: SkeletonKind,
    joints: HashMap<Joint, JointObservation>,
}

impl SkeletonObservation {
    /// Empty observation of the given kind.
    #[must_use]
    pub fn new(kind: SkeletonKind) -> Self {
        Self {
            kind,
            joints: HashMap::new(),
        }
    }

    /// Skeleton family of every joint in this observation.
    #[must_use]
    pub const fn kind(&self) -> SkeletonKind {
        self.kind
    }

    /// Record a joint. Joints from the other vocabulary are rejected and `false`
    /// is returned.
    pub fn insert(&mut self, joint: impl Into<Joint>, observation: JointObservation) -> bool {
        let joint = joint.into();
        if joint.kind() != self.kind {
            return false;
        }
        self.joints.insert(joint, observation);
        true
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with_joint(mut self, joint: impl Into<Joint>, x: f32, y: f32, confidence: f32) -> Self {
        self.insert(joint, JointObservation::new(x, y, confidence));
        self
    }

    /// The joint regardless of confidence.
    #[must_use]
    pub fn get(&self, joint: Joint) -> Option<&JointObservation> {
        self.joints.get(&joint)
    }

    /// The joint if it was recognized with confidence strictly above `threshold`.
    #[must_use]
    pub fn confident(&self, joint: Joint, threshold: f32) -> Option<&JointObservation> {
        self.get(joint).filter(|obs| obs.confidence > threshold)
    }

    /// Recorded joints in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&Joint, &JointObservation)> {
        self.joints.iter()
    }

    /// Number of recorded joints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }
}
