//! End-to-end homomorphic properties of the multi-key evaluator:
//! keygen -> encrypt -> evaluate -> joint decrypt.

use mkckks::math::{generate_ntt_primes, GaussianSampler};
use mkckks::mk::{
    decode_coeffs, decrypt, encode_coeffs, encrypt, gen_galois_key, gen_public_key,
    gen_relin_key, gen_secret_key, sample_crs, Evaluator, GaloisKey, MkCiphertext, PublicKey,
    RelinKey, SecretKey,
};
use mkckks::rlwe::Context;
use mkckks::MkParams;

fn test_params() -> MkParams {
    let n = 64;
    let p55 = generate_ntt_primes(55, n, 3);
    let q45 = generate_ntt_primes(45, n, 3);
    let mut moduli_q = vec![p55[0]];
    moduli_q.extend_from_slice(&q45);
    MkParams {
        ring_dim: n,
        moduli_q,
        moduli_p: p55[1..3].to_vec(),
        pow2_base: 0,
        scale: (1u64 << 40) as f64,
        sigma: 3.2,
    }
}

struct Party {
    sk: SecretKey,
    pk: PublicKey,
    rk: RelinKey,
}

fn setup(ctx: &Context, ids: &[u64], seed: u64) -> Vec<Party> {
    let crs = sample_crs(ctx, 424242);
    let mut sampler = GaussianSampler::with_seed(ctx.params.sigma, seed);
    ids.iter()
        .map(|&id| {
            let sk = gen_secret_key(ctx, id, &mut sampler);
            let pk = gen_public_key(ctx, &sk, &crs, &mut sampler);
            let rk = gen_relin_key(ctx, &sk, &crs, &mut sampler);
            Party { sk, pk, rk }
        })
        .collect()
}

fn galois_keys(ctx: &Context, parties: &[Party], n: i64, seed: u64) -> Vec<GaloisKey> {
    let galois_el = ctx.params.galois_element_for_rotation(n);
    let mut sampler = GaussianSampler::with_seed(ctx.params.sigma, seed);
    parties
        .iter()
        .map(|p| gen_galois_key(ctx, &p.sk, galois_el, &mut sampler))
        .collect()
}

/// Decrypt, project to a decodable level and read the coefficients.
fn decrypt_decode(ctx: &Context, ct: &MkCiphertext, sks: &[SecretKey]) -> Vec<f64> {
    let m = decrypt(ctx, ct, sks).unwrap();
    let low = m.clone_at_level(1.min(m.level()));
    decode_coeffs(ctx, &low, ct.ct.scale)
}

#[test]
fn test_additive_homomorphism_disjoint_parties() {
    let ctx = Context::new(test_params()).unwrap();
    let eval = Evaluator::new(&ctx);
    let parties = setup(&ctx, &[2, 5], 1);
    let mut sampler = GaussianSampler::with_seed(ctx.params.sigma, 100);

    let v1: Vec<f64> = (0..8).map(|i| (i as f64) / 2.0 - 1.0).collect();
    let v2: Vec<f64> = (0..8).map(|i| (i as f64) / 4.0).collect();

    let pt1 = encode_coeffs(&ctx, &v1, ctx.max_level(), ctx.params.scale);
    let pt2 = encode_coeffs(&ctx, &v2, ctx.max_level(), ctx.params.scale);
    let ct1 = encrypt(&ctx, &pt1, &parties[0].pk, &mut sampler).unwrap();
    let ct2 = encrypt(&ctx, &pt2, &parties[1].pk, &mut sampler).unwrap();

    let sum = eval.add(&ct1, &ct2).unwrap();
    assert_eq!(sum.peer_ids, vec![2, 5]);
    assert_eq!(sum.ct.parts.len(), 3);

    let sks: Vec<SecretKey> = parties.iter().map(|p| p.sk.clone()).collect();
    let decoded = decrypt_decode(&ctx, &sum, &sks);
    for c in 0..8 {
        assert!(
            (decoded[c] - (v1[c] + v2[c])).abs() < 1e-3,
            "coeff {}: {} vs {}",
            c,
            decoded[c],
            v1[c] + v2[c]
        );
    }
}

#[test]
fn test_add_concrete_part_layout() {
    // PeerID=[2] + PeerID=[5]: part 1 must equal A's participant part and
    // part 2 must equal B's, bit for bit; part 0 is the ring sum.
    let ctx = Context::new(test_params()).unwrap();
    let eval = Evaluator::new(&ctx);
    let parties = setup(&ctx, &[2, 5], 2);
    let mut sampler = GaussianSampler::with_seed(ctx.params.sigma, 101);

    let pt = encode_coeffs(&ctx, &[1.0], ctx.max_level(), ctx.params.scale);
    let a = encrypt(&ctx, &pt, &parties[0].pk, &mut sampler).unwrap();
    let b = encrypt(&ctx, &pt, &parties[1].pk, &mut sampler).unwrap();

    let sum = eval.add(&a, &b).unwrap();
    assert_eq!(sum.peer_ids, vec![2, 5]);

    fn part(ct: &MkCiphertext, i: usize) -> &mkckks::math::RnsPoly {
        ct.ct.parts[i].as_ref().unwrap()
    }
    for j in 0..=ctx.max_level() {
        assert_eq!(part(&sum, 1).limb(j), part(&a, 1).limb(j));
        assert_eq!(part(&sum, 2).limb(j), part(&b, 1).limb(j));
        let q = ctx.params.moduli_q[j];
        for c in 0..ctx.params.ring_dim {
            let expected =
                (part(&a, 0).limb(j)[c] as u128 + part(&b, 0).limb(j)[c] as u128) % q as u128;
            assert_eq!(part(&sum, 0).limb(j)[c] as u128, expected);
        }
    }
}

#[test]
fn test_subtraction_of_self_is_zero() {
    let ctx = Context::new(test_params()).unwrap();
    let eval = Evaluator::new(&ctx);
    let parties = setup(&ctx, &[3], 3);
    let mut sampler = GaussianSampler::with_seed(ctx.params.sigma, 102);

    let pt = encode_coeffs(&ctx, &[2.5, -1.0], ctx.max_level(), ctx.params.scale);
    let ct = encrypt(&ctx, &pt, &parties[0].pk, &mut sampler).unwrap();

    let diff = eval.sub(&ct, &ct).unwrap();
    let decoded = decrypt_decode(&ctx, &diff, &[parties[0].sk.clone()]);
    for (c, &v) in decoded.iter().take(4).enumerate() {
        assert!(v.abs() < 1e-6, "coeff {} not cancelled: {}", c, v);
    }
}

#[test]
fn test_multiplicative_homomorphism_single_party() {
    // Both inputs under one participant: 4-part tensor, 2-part output.
    let ctx = Context::new(test_params()).unwrap();
    let eval = Evaluator::new(&ctx);
    let parties = setup(&ctx, &[7], 4);
    let mut sampler = GaussianSampler::with_seed(ctx.params.sigma, 103);

    let pt1 = encode_coeffs(&ctx, &[1.5], ctx.max_level(), ctx.params.scale);
    let pt2 = encode_coeffs(&ctx, &[2.0], ctx.max_level(), ctx.params.scale);
    let ct1 = encrypt(&ctx, &pt1, &parties[0].pk, &mut sampler).unwrap();
    let ct2 = encrypt(&ctx, &pt2, &parties[0].pk, &mut sampler).unwrap();

    let mut prod = eval.mul(&ct1, &ct2).unwrap();
    assert_eq!(prod.ct.parts.len(), 4);

    let rks = vec![parties[0].rk.clone()];
    let pks = vec![parties[0].pk.clone()];
    eval.relinearize(&mut prod, &rks, &pks).unwrap();
    assert_eq!(prod.ct.parts.len(), 2);

    eval.rescale(&mut prod).unwrap();
    let _target_level = prod.ct.level - 1;
    eval.drop_level(&mut prod, _target_level).unwrap();

    let decoded = decrypt_decode(&ctx, &prod, &[parties[0].sk.clone()]);
    assert!(
        (decoded[0] - 3.0).abs() < 1e-2,
        "product decrypted to {}",
        decoded[0]
    );
}

#[test]
fn test_multiplicative_homomorphism_two_parties() {
    let ctx = Context::new(test_params()).unwrap();
    let eval = Evaluator::new(&ctx);
    let parties = setup(&ctx, &[2, 5], 5);
    let mut sampler = GaussianSampler::with_seed(ctx.params.sigma, 104);

    let pt1 = encode_coeffs(&ctx, &[3.0], ctx.max_level(), ctx.params.scale);
    let pt2 = encode_coeffs(&ctx, &[-0.5], ctx.max_level(), ctx.params.scale);
    let ct1 = encrypt(&ctx, &pt1, &parties[0].pk, &mut sampler).unwrap();
    let ct2 = encrypt(&ctx, &pt2, &parties[1].pk, &mut sampler).unwrap();

    let mut prod = eval.mul(&ct1, &ct2).unwrap();
    // k = 2 after padding: 9 parts before, 3 after relinearization.
    assert_eq!(prod.ct.parts.len(), 9);

    let rks: Vec<RelinKey> = parties.iter().map(|p| p.rk.clone()).collect();
    let pks: Vec<PublicKey> = parties.iter().map(|p| p.pk.clone()).collect();
    eval.relinearize(&mut prod, &rks, &pks).unwrap();
    assert_eq!(prod.ct.parts.len(), 3);
    assert!(prod.is_canonical());

    eval.rescale(&mut prod).unwrap();
    let _target_level = prod.ct.level - 1;
    eval.drop_level(&mut prod, _target_level).unwrap();

    let sks: Vec<SecretKey> = parties.iter().map(|p| p.sk.clone()).collect();
    let decoded = decrypt_decode(&ctx, &prod, &sks);
    assert!(
        (decoded[0] - (-1.5)).abs() < 1e-2,
        "product decrypted to {}",
        decoded[0]
    );
}

#[test]
fn test_relinearization_rejects_mismatched_keys() {
    let ctx = Context::new(test_params()).unwrap();
    let eval = Evaluator::new(&ctx);
    let parties = setup(&ctx, &[2, 5], 6);
    let stranger = setup(&ctx, &[9], 7);
    let mut sampler = GaussianSampler::with_seed(ctx.params.sigma, 105);

    let pt = encode_coeffs(&ctx, &[1.0], ctx.max_level(), ctx.params.scale);
    let ct1 = encrypt(&ctx, &pt, &parties[0].pk, &mut sampler).unwrap();
    let ct2 = encrypt(&ctx, &pt, &parties[1].pk, &mut sampler).unwrap();
    let mut prod = eval.mul(&ct1, &ct2).unwrap();

    // Wrong participant in the key list is fatal.
    let rks = vec![parties[0].rk.clone(), stranger[0].rk.clone()];
    let pks = vec![parties[0].pk.clone(), parties[1].pk.clone()];
    assert!(eval.relinearize(&mut prod, &rks, &pks).is_err());

    // Missing keys are fatal too.
    let rks_short = vec![parties[0].rk.clone()];
    assert!(eval.relinearize(&mut prod, &rks_short, &pks).is_err());
}

#[test]
fn test_rotation_inverse_two_parties() {
    let ctx = Context::new(test_params()).unwrap();
    let mut eval = Evaluator::new(&ctx);
    let parties = setup(&ctx, &[2, 5], 8);
    let mut sampler = GaussianSampler::with_seed(ctx.params.sigma, 106);

    let values: Vec<f64> = (0..16).map(|i| ((i * 7) % 5) as f64 - 2.0).collect();
    let pt1 = encode_coeffs(&ctx, &values, ctx.max_level(), ctx.params.scale);
    let pt2 = encode_coeffs(&ctx, &[1.0], ctx.max_level(), ctx.params.scale);
    let ct1 = encrypt(&ctx, &pt1, &parties[0].pk, &mut sampler).unwrap();
    let ct2 = encrypt(&ctx, &pt2, &parties[1].pk, &mut sampler).unwrap();
    let ct = eval.add(&ct1, &ct2).unwrap();

    let n = 3i64;
    let keys_fwd = galois_keys(&ctx, &parties, n, 500);
    let keys_bwd = galois_keys(&ctx, &parties, -n, 501);

    let rotated = eval.rotate(&ct, n, &keys_fwd).unwrap();
    assert_eq!(rotated.peer_ids, ct.peer_ids);
    assert_eq!(rotated.ct.level, ct.ct.level);

    let back = eval.rotate(&rotated, -n, &keys_bwd).unwrap();

    let sks: Vec<SecretKey> = parties.iter().map(|p| p.sk.clone()).collect();
    let expected = decrypt_decode(&ctx, &ct, &sks);
    let decoded = decrypt_decode(&ctx, &back, &sks);
    for c in 0..16 {
        assert!(
            (decoded[c] - expected[c]).abs() < 1e-2,
            "coeff {}: {} vs {}",
            c,
            decoded[c],
            expected[c]
        );
    }
}

#[test]
fn test_rotation_rejects_wrong_galois_element() {
    let ctx = Context::new(test_params()).unwrap();
    let mut eval = Evaluator::new(&ctx);
    let parties = setup(&ctx, &[4], 9);
    let mut sampler = GaussianSampler::with_seed(ctx.params.sigma, 107);

    let pt = encode_coeffs(&ctx, &[1.0], ctx.max_level(), ctx.params.scale);
    let ct = encrypt(&ctx, &pt, &parties[0].pk, &mut sampler).unwrap();

    let keys = galois_keys(&ctx, &parties, 2, 502);
    assert!(eval.rotate(&ct, 3, &keys).is_err());
}

#[test]
fn test_rescale_tracks_scale_and_level() {
    let ctx = Context::new(test_params()).unwrap();
    let eval = Evaluator::new(&ctx);
    let parties = setup(&ctx, &[1], 10);
    let mut sampler = GaussianSampler::with_seed(ctx.params.sigma, 108);

    let pt = encode_coeffs(&ctx, &[1.0], ctx.max_level(), ctx.params.scale);
    let mut ct = encrypt(&ctx, &pt, &parties[0].pk, &mut sampler).unwrap();

    let level_before = ct.ct.level;
    let scale_before = ct.ct.scale;
    let q_last = ctx.params.moduli_q[level_before];
    eval.rescale(&mut ct).unwrap();

    assert_eq!(ct.ct.level, level_before - 1);
    assert!((ct.ct.scale - scale_before / q_last as f64).abs() < 1e-6);
}

#[test]
fn test_plaintext_ops_end_to_end() {
    let ctx = Context::new(test_params()).unwrap();
    let eval = Evaluator::new(&ctx);
    let parties = setup(&ctx, &[2, 5], 11);
    let mut sampler = GaussianSampler::with_seed(ctx.params.sigma, 109);

    let pt1 = encode_coeffs(&ctx, &[2.0], ctx.max_level(), ctx.params.scale);
    let pt2 = encode_coeffs(&ctx, &[0.25], ctx.max_level(), ctx.params.scale);
    let ct1 = encrypt(&ctx, &pt1, &parties[0].pk, &mut sampler).unwrap();
    let ct2 = encrypt(&ctx, &pt2, &parties[1].pk, &mut sampler).unwrap();
    let ct = eval.add(&ct1, &ct2).unwrap();

    let sks: Vec<SecretKey> = parties.iter().map(|p| p.sk.clone()).collect();

    // (2.25) + 0.5 = 2.75
    let pt_add = encode_coeffs(&ctx, &[0.5], ctx.max_level(), ctx.params.scale);
    let sum = eval.add_plaintext(&ct, &pt_add).unwrap();
    let decoded = decrypt_decode(&ctx, &sum, &sks);
    assert!((decoded[0] - 2.75).abs() < 1e-3, "got {}", decoded[0]);

    // (2.25) * 2.0 = 4.5, with scale growing to the product
    let pt_mul = encode_coeffs(&ctx, &[2.0], ctx.max_level(), ctx.params.scale);
    let mut prod = eval.mul_plaintext(&ct, &pt_mul).unwrap();
    assert_eq!(prod.ct.scale, ct.ct.scale * pt_mul.scale);
    eval.rescale(&mut prod).unwrap();
    let _target_level = prod.ct.level - 1;
    eval.drop_level(&mut prod, _target_level).unwrap();
    let decoded = decrypt_decode(&ctx, &prod, &sks);
    assert!((decoded[0] - 4.5).abs() < 1e-2, "got {}", decoded[0]);
}
