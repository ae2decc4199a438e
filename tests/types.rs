// ABOUTME: Integration tests for service names, versions, and skiff image names.
// ABOUTME: Tests validation rules and the tag format the version history is read from.

use proptest::prelude::*;
use skiff::types::*;

fn web() -> ServiceName {
    ServiceName::new("web").unwrap()
}

mod service_name_tests {
    use super::*;

    #[test]
    fn valid_dns_name() {
        let name = ServiceName::new("my-service2").unwrap();
        assert_eq!(name.as_str(), "my-service2");
        assert_eq!(name.to_string(), "my-service2");
    }

    #[test]
    fn empty_returns_error() {
        assert!(matches!(ServiceName::new(""), Err(ServiceNameError::Empty)));
    }

    #[test]
    fn leaves_room_for_canary_suffix() {
        assert!(ServiceName::new(&"a".repeat(56)).is_ok());
        assert!(matches!(
            ServiceName::new(&"a".repeat(57)),
            Err(ServiceNameError::TooLong)
        ));
    }

    #[test]
    fn hyphens_only_inside() {
        assert!(matches!(
            ServiceName::new("-web"),
            Err(ServiceNameError::StartsWithHyphen)
        ));
        assert!(matches!(
            ServiceName::new("web-"),
            Err(ServiceNameError::EndsWithHyphen)
        ));
    }

    #[test]
    fn uppercase_returns_error() {
        assert!(matches!(
            ServiceName::new("Web"),
            Err(ServiceNameError::NotLowercase)
        ));
    }

    #[test]
    fn underscores_and_dots_are_rejected() {
        assert!(matches!(
            ServiceName::new("my_web"),
            Err(ServiceNameError::InvalidChar('_'))
        ));
        assert!(ServiceName::new("web.internal").is_err());
    }

    #[test]
    fn canary_suffix_is_reserved() {
        assert!(matches!(
            ServiceName::new("web-canary"),
            Err(ServiceNameError::ReservedSuffix)
        ));
        assert_eq!(web().canary(), "web-canary");
    }

    #[test]
    fn deserializes_with_validation() {
        let name: ServiceName = serde_json::from_str("\"api\"").unwrap();
        assert_eq!(name.as_str(), "api");
        assert!(serde_json::from_str::<ServiceName>("\"API\"").is_err());
    }
}

mod version_tests {
    use super::*;

    #[test]
    fn undeployed_is_zero_and_first_deploy_is_one() {
        assert_eq!(Version::UNDEPLOYED.get(), 0);
        assert_eq!(Version::UNDEPLOYED.next(), Some(Version::new(1)));
    }

    #[test]
    fn previous_needs_an_earlier_deploy() {
        assert_eq!(Version::new(5).previous(), Some(Version::new(4)));
        assert_eq!(Version::new(1).previous(), None);
    }

    #[test]
    fn serializes_as_plain_number() {
        assert_eq!(serde_json::to_string(&Version::new(9)).unwrap(), "9");
    }
}

mod image_name_tests {
    use super::*;

    #[test]
    fn name_joins_prefix_project_and_service() {
        let image = ImageName::new("skiff", "shop", &web());
        assert_eq!(image.as_str(), "skiff-shop-web");
        assert_eq!(image.tagged(Version::new(3)), "skiff-shop-web:3");
    }

    #[test]
    fn version_of_ignores_other_services_and_registries() {
        let image = ImageName::new("skiff", "shop", &web());
        assert_eq!(image.version_of("skiff-shop-api:3"), None);
        assert_eq!(image.version_of("ghcr.io/skiff-shop-web:3"), None);
        assert_eq!(image.version_of("skiff-shop-web:3@sha256:abc"), None);
        assert_eq!(image.version_of("skiff-shop-web"), None);
    }

    proptest! {
        #[test]
        fn tagged_reference_reads_back(version in 0u64..u64::MAX, project in "[a-z][a-z0-9-]{0,12}") {
            let image = ImageName::new("skiff", &project, &web());
            let reference = image.tagged(Version::new(version));
            prop_assert_eq!(image.version_of(&reference), Some(Version::new(version)));
        }

        #[test]
        fn non_numeric_tags_have_no_version(tag in "[a-z._-][a-z0-9._-]{0,10}") {
            let image = ImageName::new("skiff", "shop", &web());
            let reference = format!("skiff-shop-web:{tag}");
            prop_assert_eq!(image.version_of(&reference), None);
        }
    }
}
