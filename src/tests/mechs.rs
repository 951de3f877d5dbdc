// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

use super::util::*;
use crate::mechanism::{Descriptor, Mechanisms, MAX_KEY_TYPES};
use crate::pkcs11::*;

use serial_test::parallel;

fn sign_descriptor(
    key_type: CK_KEY_TYPE,
    min: CK_ULONG,
    max: CK_ULONG,
) -> Descriptor {
    Descriptor::new_token_mechanism(
        CKM_RSA_PKCS,
        CK_MECHANISM_INFO {
            ulMinKeySize: min,
            ulMaxKeySize: max,
            flags: CKF_SIGN | CKF_VERIFY,
        },
        key_type,
    )
}

#[test]
#[parallel]
fn test_register_and_find() {
    let mut mechs = Mechanisms::new();
    let stored = mechs.register(&sign_descriptor(CKK_RSA, 1024, 4096)).unwrap();
    assert_eq!(stored.mech(), CKM_RSA_PKCS);
    assert_eq!(mechs.len(), 1);

    /* flags must be a superset of the requested ones */
    assert!(mechs.find(CKM_RSA_PKCS, CKF_SIGN).is_some());
    assert!(mechs.find(CKM_RSA_PKCS, CKF_SIGN | CKF_VERIFY).is_some());
    assert!(mechs.find(CKM_RSA_PKCS, CKF_DERIVE).is_none());
    assert!(mechs.find(CKM_ECDSA, CKF_SIGN).is_none());

    let mt = mechs.find(CKM_RSA_PKCS, CKF_SIGN).unwrap();
    assert!(mt.validate_key_type(CKK_RSA).is_ok());
    assert_eq!(
        mt.validate_key_type(CKK_EC).unwrap_err().rv(),
        CKR_KEY_TYPE_INCONSISTENT
    );
}

#[test]
#[parallel]
fn test_register_merges() {
    let mut mechs = Mechanisms::new();
    mechs.register(&sign_descriptor(CKK_RSA, 2048, 3072)).unwrap();

    /* same mechanism, new key type, wider range, extra flag */
    let mut other = Descriptor::new_token_mechanism(
        CKM_RSA_PKCS,
        CK_MECHANISM_INFO {
            ulMinKeySize: 1024,
            ulMaxKeySize: 4096,
            flags: CKF_SIGN | CKF_ENCRYPT,
        },
        CKK_EC,
    );
    let stored = mechs.register(&other).unwrap();
    assert_eq!(mechs.len(), 1);
    assert!(stored.key_types().contains(CKK_RSA));
    assert!(stored.key_types().contains(CKK_EC));
    assert_eq!(stored.info().ulMinKeySize, 1024);
    assert_eq!(stored.info().ulMaxKeySize, 4096);
    assert_eq!(
        stored.info().flags,
        CKF_SIGN | CKF_VERIFY | CKF_ENCRYPT
    );

    /* re-registering a known key type only refreshes the info */
    other = sign_descriptor(CKK_EC, 512, 8192);
    let stored = mechs.register(&other).unwrap();
    assert_eq!(mechs.len(), 1);
    assert_eq!(stored.key_types().as_slice().len(), 2);
    assert_eq!(stored.info().ulMinKeySize, 512);
    assert_eq!(stored.info().ulMaxKeySize, 8192);
}

#[test]
#[parallel]
fn test_register_capacity_error() {
    let mut mechs = Mechanisms::new();
    let types = [CKK_RSA, CKK_EC, CKK_GOSTR3410, CKK_DSA];
    assert_eq!(types.len(), MAX_KEY_TYPES);
    for kt in types {
        mechs.register(&sign_descriptor(kt, 1024, 4096)).unwrap();
    }
    let before = mechs.find(CKM_RSA_PKCS, 0).unwrap();
    assert_eq!(before.key_types().as_slice().len(), MAX_KEY_TYPES);

    /* one key type too many, with an info that must not leak in */
    let err = mechs
        .register(&sign_descriptor(CKK_DH, 1, 65536))
        .unwrap_err();
    assert_eq!(err.rv(), CKR_BUFFER_TOO_SMALL);

    let after = mechs.find(CKM_RSA_PKCS, 0).unwrap();
    assert_eq!(after.key_types().as_slice(), before.key_types().as_slice());
    assert!(!after.key_types().contains(CKK_DH));
    assert_eq!(after.info().ulMinKeySize, 1024);
    assert_eq!(after.info().ulMaxKeySize, 4096);
}

#[test]
#[parallel]
fn test_mechanism_list_and_info() {
    let testtokn = TestToken::initialized();

    let mut count: CK_ULONG = 0;
    testtokn.token.get_mechanism_list(None, &mut count).unwrap();
    let total = count as usize;
    assert!(total > 4);

    /* truncated enumeration still reports the true count */
    let mut small = vec![0 as CK_MECHANISM_TYPE; 2];
    let err = testtokn
        .token
        .get_mechanism_list(Some(&mut small), &mut count)
        .unwrap_err();
    assert_eq!(err.rv(), CKR_BUFFER_TOO_SMALL);
    assert_eq!(count as usize, total);

    let mut full = vec![0 as CK_MECHANISM_TYPE; total];
    testtokn
        .token
        .get_mechanism_list(Some(&mut full), &mut count)
        .unwrap();
    assert_eq!(count as usize, total);
    assert_eq!(&full[..2], &small[..]);
    assert!(full.contains(&CKM_SHA256_RSA_PKCS));

    let info = testtokn.token.get_mechanism_info(CKM_RSA_PKCS).unwrap();
    assert_eq!(info.flags & CKF_SIGN, CKF_SIGN);
    assert_eq!(
        testtokn
            .token
            .get_mechanism_info(CKM_GOSTR3411)
            .unwrap_err()
            .rv(),
        CKR_MECHANISM_INVALID
    );
}
