use rusty_fuser::registry::{register_builtin_fusers, FuserRegistry};
use rusty_fuser::{ConvFuser, Error, Fuser, FuserConfig, Result, Tensor};

#[test]
fn empty_registry_knows_nothing() {
    let registry = FuserRegistry::new();
    assert!(!registry.contains(ConvFuser::TYPE));
    let config = FuserConfig::new("ConvFuser", vec![4, 8], 16);
    assert!(matches!(registry.build(&config), Err(Error::UnknownFuser(tag)) if tag == "ConvFuser"));
}

#[test]
fn builtins_are_registered_explicitly() {
    let mut registry = FuserRegistry::new();
    register_builtin_fusers(&mut registry).unwrap();
    assert_eq!(registry.tags().collect::<Vec<_>>(), vec!["ConvFuser"]);

    // A second registration of the same tag is refused.
    assert!(matches!(
        register_builtin_fusers(&mut registry),
        Err(Error::DuplicateFuser(tag)) if tag == "ConvFuser"
    ));
}

#[test]
fn builds_fuser_from_toml_config() {
    let config = FuserConfig::from_toml_str(
        r#"
        type = "ConvFuser"
        in_channels = [4, 8]
        out_channels = 16
        "#,
    )
    .unwrap();
    let fuser = FuserRegistry::with_builtins().unwrap().build(&config).unwrap();
    assert_eq!(fuser.in_channels(), &[4, 8]);
    assert_eq!(fuser.out_channels(), 16);

    let out = fuser
        .fuse(&[Tensor::rand(vec![2, 4, 10, 10]), Tensor::rand(vec![2, 8, 20, 20])])
        .unwrap();
    assert_eq!(out.shape(), vec![2, 16, 20, 20]);
}

#[test]
fn invalid_config_surfaces_through_build() {
    let registry = FuserRegistry::with_builtins().unwrap();
    let config = FuserConfig::new(ConvFuser::TYPE, vec![4], 16);
    assert!(matches!(registry.build(&config), Err(Error::InvalidConfig(_))));
}

fn wide_conv_fuser(config: &FuserConfig) -> Result<Box<dyn Fuser>> {
    let doubled = FuserConfig::new(ConvFuser::TYPE, config.in_channels.clone(), config.out_channels * 2);
    ConvFuser::build(&doubled)
}

#[test]
fn custom_constructors_can_be_registered() {
    let mut registry = FuserRegistry::with_builtins().unwrap();
    registry.register("WideConvFuser", wide_conv_fuser).unwrap();
    assert!(registry.contains("WideConvFuser"));

    let fuser = registry
        .build(&FuserConfig::new("WideConvFuser", vec![2, 2], 3))
        .unwrap();
    assert_eq!(fuser.out_channels(), 6);
}

#[test]
fn with_builtins_returns_populated_registry() {
    let registry = FuserRegistry::with_builtins().unwrap();
    assert!(registry.contains(ConvFuser::TYPE));
    assert_eq!(registry.tags().count(), 1);
}
