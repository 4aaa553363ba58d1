use super::*;
use crate::engine::test_fixtures;

fn module(wat: &str) -> CompiledModule {
    CompiledModule::from_bytes(wat::parse_str(wat).unwrap()).unwrap()
}

#[tokio::test]
async fn test_render_interleaves_mono_module_on_every_channel() {
    let Processor {
        mut driver,
        service,
        ..
    } = Processor::new(8_000).unwrap();
    let installer = service.installer();
    let outcome = installer
        .install(module(test_fixtures::COUNTER), installer.next_generation())
        .await;
    assert!(matches!(outcome, InstallOutcome::Installed));

    let pcm = render_interleaved(&mut driver, 2, 3, 2);
    assert_eq!(pcm, vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0, 5.0, 5.0, 6.0, 6.0]);
}

#[test]
fn test_render_without_module_is_silence() {
    let Processor { mut driver, .. } = Processor::new(8_000).unwrap();
    let pcm = render_interleaved(&mut driver, 1, 4, 2);
    assert_eq!(pcm, vec![0.0; 8]);
}

#[test]
fn test_wav_output_is_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("out.wav");
    write_wav(&path, &[0.0, 0.5, -0.5, 2.0], 22_050, 2, BitDepth::Bit16).unwrap();

    let reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 22_050);
    assert_eq!(spec.bits_per_sample, 16);
    let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
    assert_eq!(samples, vec![0, 16_384, -16_384, i16::MAX]);
}
