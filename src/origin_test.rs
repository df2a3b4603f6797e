use super::*;

fn url(input: &str) -> Url {
    Url::parse(input).expect("valid test URL")
}

mod of {
    use super::*;

    #[test]
    fn should_ignore_path_and_query_given_same_authority() {
        let left = Origin::of(&url("https://a.example/one?x=1"));
        let right = Origin::of(&url("https://a.example/two#frag"));

        assert_eq!(left, right);
    }

    #[test]
    fn should_differ_given_different_port() {
        let left = Origin::of(&url("https://a.example"));
        let right = Origin::of(&url("https://a.example:8443"));

        assert_ne!(left, right);
    }

    #[test]
    fn should_be_opaque_given_data_url() {
        let origin = Origin::of(&url("data:text/plain,hello"));

        assert!(origin.is_opaque());
    }
}

mod parse {
    use super::*;

    #[test]
    fn should_return_bad_uri_given_garbage() {
        assert_eq!(Origin::parse("not a url"), Err(CorsError::BadUri));
    }
}

mod new_opaque {
    use super::*;

    #[test]
    fn should_never_equal_another_opaque_origin() {
        let first = Origin::new_opaque();
        let second = Origin::new_opaque();

        assert_ne!(first, second);
        assert_eq!(first, first.clone());
    }

    #[test]
    fn should_never_equal_a_concrete_origin() {
        let concrete = Origin::of(&url("https://a.example"));

        assert_ne!(Origin::new_opaque(), concrete);
    }

    #[test]
    fn should_serialize_as_null() {
        assert_eq!(Origin::new_opaque().ascii_serialization(), "null");
    }
}

mod may_load {
    use super::*;

    #[test]
    fn should_allow_given_same_origin_url() {
        let origin = Origin::of(&url("https://a.example/page"));

        assert!(origin.may_load(&url("https://a.example/api")));
    }

    #[test]
    fn should_refuse_given_cross_origin_url() {
        let origin = Origin::of(&url("https://a.example/page"));

        assert!(!origin.may_load(&url("https://b.example/api")));
        assert!(!origin.may_load(&url("http://a.example/api")));
    }

    #[test]
    fn should_refuse_given_opaque_requester() {
        let origin = Origin::new_opaque();

        assert!(!origin.may_load(&url("https://a.example/")));
        assert!(!origin.same_origin(&origin.clone()));
    }
}

mod check_load {
    use super::*;

    #[test]
    fn should_admit_web_schemes_given_cross_origin_target() {
        let origin = Origin::of(&url("https://a.example"));

        assert!(origin.check_load(&url("https://b.example/")).is_ok());
        assert!(origin.check_load(&url("http://b.example/")).is_ok());
        assert!(origin.check_load(&url("data:text/plain,x")).is_ok());
    }

    #[test]
    fn should_deny_given_file_scheme() {
        let origin = Origin::of(&url("https://a.example"));

        assert_eq!(
            origin.check_load(&url("file:///etc/passwd")),
            Err(CorsError::LoadDenied("file".into()))
        );
    }
}

mod ascii_serialization {
    use super::*;

    #[test]
    fn should_omit_default_port() {
        let origin = Origin::of(&url("https://a.example:443/x"));

        assert_eq!(origin.ascii_serialization(), "https://a.example");
    }

    #[test]
    fn should_keep_explicit_port() {
        let origin = Origin::of(&url("http://a.example:8080/x"));

        assert_eq!(origin.ascii_serialization(), "http://a.example:8080");
    }
}
