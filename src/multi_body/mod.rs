use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use nalgebra::{Isometry3, Translation3, Unit, UnitQuaternion, Vector3};
use petgraph::visit::Bfs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use urdf_rs::{read_file, read_from_string};

use crate::kinematics::{Segment, ARM_DOF};
use crate::pose::Side;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to parse robot description: {0}")]
    Urdf(#[from] urdf_rs::UrdfError),
    #[error("unknown link `{0}`")]
    UnknownLink(String),
    #[error("robot description must have exactly one root link, found {0}")]
    Root(usize),
    #[error("link `{end}` is not below `{start}`")]
    NotBelow { start: String, end: String },
    #[error("link `{link}` is not on the chain from `{start}` to `{end}`")]
    NotOnChain {
        link: String,
        start: String,
        end: String,
    },
    #[error("joint `{0}` has an unsupported type for an arm chain")]
    UnsupportedJoint(String),
    #[error("arm chain `{start}` -> `{end}` has {found} movable joints, expected {expected}")]
    JointCount {
        start: String,
        end: String,
        expected: usize,
        found: usize,
    },
}

/// Link names that delimit one arm inside the robot description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmLinks {
    pub base: String,
    pub shoulder: String,
    pub elbow: String,
    pub wrist: String,
}

impl ArmLinks {
    /// Link names of the bundled dual UR5 description.
    pub fn for_side(side: Side) -> Self {
        let prefix = side.name();
        Self {
            base: "world".to_owned(),
            shoulder: format!("{prefix}_base_link"),
            elbow: format!("{prefix}_forearm_link"),
            wrist: format!("{prefix}_ee_link"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Link {
    pub name: String,
    pub local_zero_pose: Isometry3<f64>,
    pub global_zero_pose: Isometry3<f64>,
    pub joint: Option<urdf_rs::Joint>,
}

#[derive(Debug, Clone)]
pub struct MultiBody {
    // link index graph
    graph: petgraph::graphmap::DiGraphMap<usize, ()>,
    // map index -> link
    pub link_map: HashMap<usize, Link>,
    pub root_index: usize,
    pub leafs_index: Vec<usize>,
    pub name: String,
}

impl MultiBody {
    pub fn from_urdf(path: impl AsRef<Path>) -> Result<MultiBody, ModelError> {
        let robot = read_file(path)?;
        parse_robot(robot)
    }

    pub fn from_urdf_str(xml: &str) -> Result<MultiBody, ModelError> {
        let robot = read_from_string(xml)?;
        parse_robot(robot)
    }

    fn bfs(&self, start: usize) -> Vec<usize> {
        let bfs = petgraph::visit::Bfs::new(&self.graph, start);
        let iter = BfsIter {
            graph: &self.graph,
            bfs,
        };
        iter.collect()
    }

    pub fn get_link(&self, index: usize) -> Option<&Link> {
        self.link_map.get(&index)
    }

    fn get_mut_link(&mut self, index: usize) -> Option<&mut Link> {
        self.link_map.get_mut(&index)
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.graph
            .neighbors_directed(index, petgraph::Direction::Incoming)
            .next()
    }

    pub fn children(&self, index: usize) -> Vec<usize> {
        self.graph
            .neighbors_directed(index, petgraph::Direction::Outgoing)
            .collect()
    }

    pub fn find_link(&self, name: &str) -> Result<usize, ModelError> {
        self.link_map
            .iter()
            .find(|(_, link)| link.name == name)
            .map(|(index, _)| *index)
            .ok_or_else(|| ModelError::UnknownLink(name.to_owned()))
    }

    /// Pose of a link in the root frame with every joint at zero.
    pub fn zero_pose(&self, name: &str) -> Result<Isometry3<f64>, ModelError> {
        let index = self.find_link(name)?;
        self.get_link(index)
            .map(|link| link.global_zero_pose)
            .ok_or_else(|| ModelError::UnknownLink(name.to_owned()))
    }

    /// Extracts the 6-joint chain running from `links.base` down to
    /// `links.wrist`, resolving the shoulder, elbow and wrist segments on it.
    pub fn arm_chain(&self, links: &ArmLinks) -> Result<ArmChain, ModelError> {
        let start = self.find_link(&links.base)?;
        let end = self.find_link(&links.wrist)?;

        let mut chain = vec![];
        let mut current = end;
        while current != start {
            chain.push(current);
            current = self.parent(current).ok_or_else(|| ModelError::NotBelow {
                start: links.base.clone(),
                end: links.wrist.clone(),
            })?;
        }
        chain.reverse();

        let base_pose = self.zero_pose(&links.base)?;
        let mut segments = Vec::with_capacity(chain.len());
        let mut joint_count = 0;
        for index in chain {
            let link = self
                .get_link(index)
                .ok_or_else(|| ModelError::UnknownLink(index.to_string()))?;
            let axis = match &link.joint {
                Some(joint) => match joint_axis(joint)? {
                    Some(direction) => {
                        joint_count += 1;
                        Some(JointAxis {
                            direction,
                            index: joint_count - 1,
                        })
                    }
                    None => None,
                },
                None => None,
            };
            segments.push(ChainSegment {
                name: link.name.clone(),
                origin: link.local_zero_pose,
                axis,
            });
        }

        if joint_count != ARM_DOF {
            return Err(ModelError::JointCount {
                start: links.base.clone(),
                end: links.wrist.clone(),
                expected: ARM_DOF,
                found: joint_count,
            });
        }

        let position = |name: &str| {
            segments
                .iter()
                .position(|segment| segment.name == name)
                .ok_or_else(|| ModelError::NotOnChain {
                    link: name.to_owned(),
                    start: links.base.clone(),
                    end: links.wrist.clone(),
                })
        };
        let shoulder = position(&links.shoulder)?;
        let elbow = position(&links.elbow)?;
        let wrist = segments.len() - 1;

        Ok(ArmChain {
            base_pose,
            segments,
            shoulder,
            elbow,
            wrist,
        })
    }
}

struct BfsIter<'a> {
    graph: &'a petgraph::graphmap::DiGraphMap<usize, ()>,
    bfs: Bfs<usize, HashSet<usize>>,
}

impl<'a> Iterator for BfsIter<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        self.bfs.next(self.graph)
    }
}

fn parse_robot(robot: urdf_rs::Robot) -> Result<MultiBody, ModelError> {
    // link name -> link index
    let index_of: HashMap<String, usize> = robot
        .links
        .iter()
        .enumerate()
        .map(|(index, link)| (link.name.clone(), index))
        .collect();

    let mut graph = petgraph::graphmap::DiGraphMap::new();
    for index in 0..robot.links.len() {
        graph.add_node(index);
    }

    // child link index -> joint
    let mut joints = HashMap::new();
    for joint in robot.joints {
        let parent = *index_of
            .get(&joint.parent.link)
            .ok_or_else(|| ModelError::UnknownLink(joint.parent.link.clone()))?;
        let child = *index_of
            .get(&joint.child.link)
            .ok_or_else(|| ModelError::UnknownLink(joint.child.link.clone()))?;
        graph.add_edge(parent, child, ());
        joints.insert(child, joint);
    }

    let roots: Vec<usize> = graph
        .nodes()
        .filter(|index| {
            graph
                .neighbors_directed(*index, petgraph::Direction::Incoming)
                .next()
                .is_none()
        })
        .collect();
    let root = match roots.as_slice() {
        [root] => *root,
        _ => return Err(ModelError::Root(roots.len())),
    };

    let leafs = graph
        .nodes()
        .filter(|index| {
            graph
                .neighbors_directed(*index, petgraph::Direction::Outgoing)
                .next()
                .is_none()
        })
        .collect::<Vec<_>>();

    let link_map = robot
        .links
        .into_iter()
        .enumerate()
        .map(|(index, link)| {
            (
                index,
                Link {
                    name: link.name,
                    local_zero_pose: Isometry3::identity(),
                    global_zero_pose: Isometry3::identity(),
                    joint: joints.remove(&index),
                },
            )
        })
        .collect::<HashMap<_, _>>();

    let mut multi_body = MultiBody {
        graph,
        link_map,
        name: robot.name,
        root_index: root,
        leafs_index: leafs,
    };

    let bfs = multi_body.bfs(root);
    for link in bfs {
        let Some(parent_index) = multi_body.parent(link) else {
            continue;
        };
        let parent_global_pose = multi_body
            .get_link(parent_index)
            .map(|parent| parent.global_zero_pose)
            .unwrap_or_else(Isometry3::identity);
        if let Some(link) = multi_body.get_mut_link(link) {
            let relative_pose = link
                .joint
                .as_ref()
                .map(|joint| origin_to_isometry(&joint.origin))
                .unwrap_or_else(Isometry3::identity);
            link.local_zero_pose = relative_pose;
            link.global_zero_pose = parent_global_pose * relative_pose;
        }
    }
    Ok(multi_body)
}

fn joint_axis(joint: &urdf_rs::Joint) -> Result<Option<Unit<Vector3<f64>>>, ModelError> {
    match joint.joint_type {
        urdf_rs::JointType::Revolute | urdf_rs::JointType::Continuous => {
            let xyz = joint.axis.xyz.0;
            Unit::try_new(Vector3::new(xyz[0], xyz[1], xyz[2]), 1e-12)
                .map(Some)
                .ok_or_else(|| ModelError::UnsupportedJoint(joint.name.clone()))
        }
        urdf_rs::JointType::Fixed => Ok(None),
        _ => Err(ModelError::UnsupportedJoint(joint.name.clone())),
    }
}

fn origin_to_isometry(origin: &urdf_rs::Pose) -> Isometry3<f64> {
    let rpy = origin.rpy.0;
    let xyz = origin.xyz.0;
    Isometry3::from_parts(
        Translation3::new(xyz[0], xyz[1], xyz[2]),
        UnitQuaternion::from_euler_angles(rpy[0], rpy[1], rpy[2]),
    )
}

#[derive(Debug, Clone)]
pub(crate) struct JointAxis {
    pub(crate) direction: Unit<Vector3<f64>>,
    // index into the arm's joint block
    pub(crate) index: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct ChainSegment {
    pub(crate) name: String,
    pub(crate) origin: Isometry3<f64>,
    pub(crate) axis: Option<JointAxis>,
}

/// One arm's serial chain, from the link below its base down to its wrist.
#[derive(Debug, Clone)]
pub struct ArmChain {
    pub(crate) base_pose: Isometry3<f64>,
    pub(crate) segments: Vec<ChainSegment>,
    pub(crate) shoulder: usize,
    pub(crate) elbow: usize,
    pub(crate) wrist: usize,
}

impl ArmChain {
    pub(crate) fn segment_index(&self, segment: Segment) -> usize {
        match segment {
            Segment::Shoulder => self.shoulder,
            Segment::Elbow => self.elbow,
            Segment::Wrist => self.wrist,
        }
    }

    pub fn segment_name(&self, segment: Segment) -> &str {
        self.segments
            .get(self.segment_index(segment))
            .map(|s| s.name.as_str())
            .unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) const DUAL_ARM_URDF: &str = include_str!("../../urdf/dual_arm.urdf");
