use linfa::prelude::*;
use ndarray::{Array1, Array2, Axis, s};
use ndarray_rand::RandomExt;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::{Normal, Uniform};
use rand_xoshiro::Xoshiro256Plus;
use skipgp_gp::{SkipKriging, metrics};

fn main() {
    env_logger::init();

    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let x = Array2::random_using((5000, 6), Uniform::new(-1., 1.), &mut rng);
    let noise = Array1::random_using(5000, Normal::new(0., 0.1).unwrap(), &mut rng);
    let y = x.map_axis(Axis(1), |r| {
        r.iter()
            .enumerate()
            .map(|(j, v)| (std::f64::consts::PI * v).sin() / (j + 1) as f64)
            .sum::<f64>()
    }) + noise;

    let (xt, yt) = (x.slice(s![..4000, ..]), y.slice(s![..4000]));
    let (xv, yv) = (x.slice(s![4000.., ..]), y.slice(s![4000..]));

    let gp = SkipKriging::params()
        .n_iter(25)
        .learning_rate(0.05)
        .fit(&Dataset::new(xt.to_owned(), yt.to_owned()))
        .expect("SKIP GP fitting");
    println!("{gp}");

    let ypred = gp.predict(&xv).expect("SKIP GP prediction");
    let mae = metrics::mean_absolute_error(&ypred, &yv).expect("MAE");
    println!("Test MAE: {mae}");
}
