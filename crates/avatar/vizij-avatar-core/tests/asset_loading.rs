mod common;

use common::{quiet_config, DeferredLoader, Rig};
use vizij_avatar_core::{AssetCache, AvatarError, AvatarEvent, ClipRef, SkeletonConvention};

const WAVE: &str = "clips/wave_prefixed.json";

fn wave_bytes() -> Vec<u8> {
    vizij_test_fixtures::clips::bytes("wave-prefixed").expect("wave fixture")
}

/// it should share one in-flight fetch between concurrent requests
#[test]
fn concurrent_requests_share_one_fetch() {
    let loader = DeferredLoader::default();
    let mut cache = AssetCache::new(Box::new(loader.clone()));

    let mut first = cache.request(&ClipRef::from(WAVE));
    let mut second = cache.request(&ClipRef::Detailed {
        url: WAVE.into(),
        convention: SkeletonConvention::Prefixed,
    });
    assert_eq!(cache.fetch_count(), 1);
    assert_eq!(loader.open_requests(), vec![WAVE.to_string()]);
    assert!(first.poll(&mut cache).is_none());
    assert!(second.poll(&mut cache).is_none());

    loader.answer(WAVE, Ok(wave_bytes()));
    let a = first.poll(&mut cache).expect("resolved").expect("parsed");
    let b = second.poll(&mut cache).expect("resolved").expect("parsed");
    assert_eq!(a.clip, b.clip);
    assert_eq!(a.convention, SkeletonConvention::Native);
    assert_eq!(b.convention, SkeletonConvention::Prefixed);
    assert!(first.poll(&mut cache).is_none(), "a result is handed out once");

    assert!(cache.is_cached(WAVE));
    let mut third = cache.request(&ClipRef::from(WAVE));
    assert!(third.poll(&mut cache).expect("cached").is_ok());
    assert_eq!(cache.fetch_count(), 1);
}

/// it should forget failed loads so a later request retries
#[test]
fn failed_load_is_retried() {
    let loader = DeferredLoader::default();
    let mut cache = AssetCache::new(Box::new(loader.clone()));

    let mut pending = cache.request(&ClipRef::from(WAVE));
    loader.answer(WAVE, Err(AvatarError::asset_load(WAVE, "503")));
    assert!(matches!(
        pending.poll(&mut cache),
        Some(Err(AvatarError::AssetLoad { .. }))
    ));
    assert!(!cache.is_loading(WAVE));
    assert!(!cache.is_cached(WAVE));

    let mut retry = cache.request(&ClipRef::from(WAVE));
    assert_eq!(cache.fetch_count(), 2);
    loader.answer(WAVE, Ok(wave_bytes()));
    assert!(retry.poll(&mut cache).expect("resolved").is_ok());
}

/// it should surface unparsable bytes as a clip error
#[test]
fn garbage_bytes_fail_to_parse() {
    let loader = DeferredLoader::default();
    let mut cache = AssetCache::new(Box::new(loader.clone()));
    let mut pending = cache.request(&ClipRef::from("clips/garbage.json"));
    loader.answer("clips/garbage.json", Ok(b"not json".to_vec()));
    assert!(matches!(
        pending.poll(&mut cache),
        Some(Err(AvatarError::ClipParse { .. }))
    ));
}

/// it should keep ticking while a gesture clip downloads and start it once it arrives
#[test]
fn engine_waits_for_slow_gesture() {
    let loader = DeferredLoader::default();
    let mut rig = Rig::with_loader(
        quiet_config(),
        &[("idle", "idle")],
        Box::new(loader.clone()),
    );
    rig.engine
        .play_gestures(vec![ClipRef::from(WAVE), ClipRef::from(WAVE)]);
    rig.run(0.1, 5);
    assert_eq!(loader.open_requests().len(), 1);
    assert_eq!(rig.count(|e| matches!(e, AvatarEvent::GestureStarted { .. })), 0);

    loader.answer(WAVE, Ok(wave_bytes()));
    rig.tick(0.1);
    assert_eq!(rig.count(|e| matches!(e, AvatarEvent::GestureStarted { .. })), 1);

    // The queued repeat plays from cache.
    rig.run(0.1, 40);
    assert_eq!(rig.count(|e| matches!(e, AvatarEvent::GestureFinished { .. })), 2);
    assert_eq!(rig.engine.asset_fetch_count(), 1);
}
