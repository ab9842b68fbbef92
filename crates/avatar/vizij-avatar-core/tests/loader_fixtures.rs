mod common;

use common::{approx, clip, skeleton};
use vizij_avatar_core::{parse_clip_bytes, AvatarError, Channel, TrackValues};

/// it should parse every fixture clip and keep only transform tracks
#[test]
fn fixture_clips_parse() {
    for key in vizij_test_fixtures::clips::keys() {
        let bytes = vizij_test_fixtures::clips::bytes(&key).expect("fixture bytes");
        let parsed = parse_clip_bytes(&bytes).unwrap_or_else(|e| panic!("{key}: {e}"));
        assert!(parsed.duration > 0.0, "{key}");
        assert!(!parsed.tracks.is_empty(), "{key}");
    }

    let wave = clip("wave-prefixed");
    assert_eq!(wave.tracks.len(), 4, "morph track is skipped");
    assert_eq!(wave.tracks[0].bone, "mixamorig:Hips");
    assert_eq!(wave.tracks[0].channel, Channel::Position);
    match &wave.tracks[2].values {
        TrackValues::Quat(keys) => assert_eq!(keys.len(), 5),
        other => panic!("expected quaternion keys, got {other:?}"),
    }
}

/// it should build the fixture skeleton with resolved parents and bind pose
#[test]
fn fixture_skeleton_parses() {
    let skel = skeleton();
    assert_eq!(skel.len(), 20);
    assert_eq!(skel.name(skel.root()), "Hips");
    let head = skel.index_of("Head").expect("Head joint");
    let world = skel.world_pose(head, &vizij_avatar_core::JointTransform::IDENTITY);
    approx(world.position.y, 1.0 + 0.1 + 0.12 + 0.14 + 0.16 + 0.1, 1e-5);
}

/// it should surface malformed clip JSON as a parse error
#[test]
fn malformed_clip_is_a_parse_error() {
    let err = parse_clip_bytes(b"{ \"tracks\": 3 }").unwrap_err();
    assert!(matches!(err, AvatarError::ClipParse { .. }));
}
